// SPDX-License-Identifier: Apache-2.0

//! Template rule evaluation.
//!
//! Given a template (or none), an instance name, and a port, this module
//! produces the signal expression to connect. The substitution language of
//! the right-hand side supports:
//!
//! - `$1`..`$9` — capture groups of the matching port pattern
//! - `%1`..`%9` — capture groups of the instance pattern (`@` is `%1`)
//! - `port.name`, `port.width`, `port.range`, `port.input`, `port.output`,
//!   `port.inout`, `inst.name`
//! - `COND ? THEN : ELSE` with a direction boolean as the condition
//! - `add(a,b)`, `sub(a,b)`, `mul(a,b)`, `div(a,b)`, `mod(a,b)` on integers

use std::path::Path;

use regex::Regex;

use crate::diag::{Category, Diagnostics};
use crate::frontend::{PortDir, PortInfo};
use crate::template::AutoTemplate;

/// Signal values with special meaning after substitution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SignalValue {
    /// `_`: emit `.port ()`.
    Unconnected,
    Constant(ConstKind),
    Expr(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ConstKind {
    Zero,
    One,
    Z,
    X,
}

/// Formats a special constant as a sized SystemVerilog literal.
pub(crate) fn format_constant(kind: ConstKind, width: usize) -> String {
    let digit = match kind {
        ConstKind::Zero => '0',
        ConstKind::One => '1',
        ConstKind::Z => 'z',
        ConstKind::X => 'x',
    };
    format!("{}'b{}", width.max(1), digit)
}

#[derive(Clone, Debug)]
pub(crate) struct ResolvedSignal {
    pub value: SignalValue,
    /// Index of the template rule that produced the value, if any. `None`
    /// means the port name passed through untouched, which is the only case
    /// where width adaptation may rewrite the expression.
    pub matched_rule: Option<usize>,
}

/// Resolves the signal expression for one port of one instance.
pub(crate) fn resolve_signal(
    template: Option<&AutoTemplate>,
    instance: &str,
    port: &PortInfo,
    file: &Path,
    line: usize,
    diags: &mut Diagnostics,
) -> ResolvedSignal {
    let resolved = template
        .and_then(|t| apply_template(t, instance, port, file, line, diags));

    let resolved = match resolved {
        Some(r) => r,
        None => ResolvedSignal {
            value: SignalValue::Expr(port.name.clone()),
            matched_rule: None,
        },
    };

    if let SignalValue::Constant(_) = resolved.value
        && port.dir == PortDir::Output
    {
        diags.warning(
            Category::ConstantOutput,
            file,
            line,
            format!(
                "constant assignment to output port '{}' of instance '{}'",
                port.name, instance
            ),
        );
    }
    resolved
}

fn apply_template(
    template: &AutoTemplate,
    instance: &str,
    port: &PortInfo,
    file: &Path,
    line: usize,
    diags: &mut Diagnostics,
) -> Option<ResolvedSignal> {
    let inst_groups = instance_groups(template, instance, file, line, diags);

    for (index, rule) in template.rules.iter().enumerate() {
        let anchored = format!("^(?:{})$", rule.port_pattern);
        let re = match Regex::new(&anchored) {
            Ok(re) => re,
            Err(e) => {
                diags.warning(
                    Category::TemplateSyntax,
                    file,
                    template.line_number,
                    format!("invalid port pattern '{}': {e}", rule.port_pattern),
                );
                continue;
            }
        };
        let Some(caps) = re.captures(&port.name) else {
            continue;
        };
        let port_groups: Vec<String> = caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        let ctx = SubstContext {
            port_groups: &port_groups,
            inst_groups: &inst_groups,
            port,
            instance,
            file,
            line,
        };
        let signal = substitute(&rule.signal_expr, &ctx, diags);
        log::trace!(
            "template rule {index} for {}.{} -> {signal}",
            instance,
            port.name
        );
        return Some(ResolvedSignal {
            value: classify(&signal),
            matched_rule: Some(index),
        });
    }
    None
}

/// Binds the instance capture groups. With no explicit pattern the first
/// decimal run in the instance name becomes `%1`.
fn instance_groups(
    template: &AutoTemplate,
    instance: &str,
    file: &Path,
    line: usize,
    diags: &mut Diagnostics,
) -> Vec<String> {
    let pattern = if template.instance_pattern.is_empty() {
        r"(\d+)"
    } else {
        template.instance_pattern.as_str()
    };
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            diags.warning(
                Category::TemplateSyntax,
                file,
                line,
                format!("invalid instance pattern '{pattern}': {e}"),
            );
            return Vec::new();
        }
    };
    re.captures(instance)
        .map(|caps| {
            caps.iter()
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

struct SubstContext<'a> {
    port_groups: &'a [String],
    inst_groups: &'a [String],
    port: &'a PortInfo,
    instance: &'a str,
    file: &'a Path,
    line: usize,
}

fn substitute(expr: &str, ctx: &SubstContext, diags: &mut Diagnostics) -> String {
    let expr = expr.trim();
    if let Some((cond, then_branch, else_branch)) = split_ternary(expr) {
        let cond_value = substitute_vars(cond.trim(), ctx);
        let chosen = if cond_value.trim() == "1" {
            then_branch
        } else {
            else_branch
        };
        return substitute(chosen, ctx, diags);
    }
    let vars = substitute_vars(expr, ctx);
    fold_math(&vars, ctx, diags)
}

/// Splits `COND ? THEN : ELSE` at the top nesting level, honoring nested
/// ternaries in the THEN branch.
fn split_ternary(expr: &str) -> Option<(&str, &str, &str)> {
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut question = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'?' if depth == 0 => {
                question = Some(i);
                break;
            }
            _ => {}
        }
    }
    let q = question?;
    let mut depth = 0i32;
    let mut nested = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(q + 1) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'?' if depth == 0 => nested += 1,
            b':' if depth == 0 => {
                if nested == 0 {
                    return Some((&expr[..q], &expr[q + 1..i], &expr[i + 1..]));
                }
                nested -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Replaces `$N`, `%N`, `@`, `port.*`, and `inst.name` in one pass.
fn substitute_vars(expr: &str, ctx: &SubstContext) -> String {
    let mut out = String::with_capacity(expr.len());
    let bytes = expr.as_bytes();
    let mut i = 0;
    let mut prev_ident = false;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '$' if i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() => {
                let n = (bytes[i + 1] - b'0') as usize;
                out.push_str(ctx.port_groups.get(n).map(String::as_str).unwrap_or(""));
                i += 2;
                prev_ident = false;
            }
            '%' if i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() => {
                let n = (bytes[i + 1] - b'0') as usize;
                out.push_str(ctx.inst_groups.get(n).map(String::as_str).unwrap_or(""));
                i += 2;
                prev_ident = false;
            }
            '@' => {
                out.push_str(ctx.inst_groups.get(1).map(String::as_str).unwrap_or(""));
                i += 1;
                prev_ident = false;
            }
            _ if !prev_ident && expr[i..].starts_with("port.") => {
                let (replacement, consumed) = port_variable(&expr[i..], ctx.port);
                match replacement {
                    Some(value) => {
                        out.push_str(&value);
                        i += consumed;
                    }
                    None => {
                        out.push(c);
                        i += 1;
                    }
                }
                prev_ident = true;
            }
            _ if !prev_ident && expr[i..].starts_with("inst.name") => {
                out.push_str(ctx.instance);
                i += "inst.name".len();
                prev_ident = true;
            }
            _ => {
                out.push(c);
                i += 1;
                prev_ident = c.is_ascii_alphanumeric() || c == '_' || c == '$';
            }
        }
    }
    out
}

fn port_variable(rest: &str, port: &PortInfo) -> (Option<String>, usize) {
    let suffixes: [(&str, fn(&PortInfo) -> String); 6] = [
        ("port.name", |p| p.name.clone()),
        ("port.width", |p| p.width.to_string()),
        ("port.range", |p| match &p.range_str {
            Some(r) => r.clone(),
            None if p.width > 1 => format!("[{}:0]", p.width - 1),
            None => String::new(),
        }),
        ("port.input", |p| bool_str(p.dir == PortDir::Input)),
        ("port.output", |p| bool_str(p.dir == PortDir::Output)),
        ("port.inout", |p| bool_str(p.dir == PortDir::Inout)),
    ];
    for (name, f) in suffixes.iter() {
        if rest.starts_with(name) {
            return (Some(f(port)), name.len());
        }
    }
    (None, 0)
}

fn bool_str(v: bool) -> String {
    if v { "1".to_string() } else { "0".to_string() }
}

const MATH_FUNCS: [&str; 5] = ["add", "sub", "mul", "div", "mod"];

/// Evaluates arithmetic function calls, innermost first.
fn fold_math(expr: &str, ctx: &SubstContext, diags: &mut Diagnostics) -> String {
    let mut out = expr.to_string();
    loop {
        let Some((start, open)) = find_math_call(&out) else {
            return out;
        };
        let Some(close) = matching_paren(&out, open) else {
            return out;
        };
        let name = &out[start..open];
        let args = fold_math(&out[open + 1..close], ctx, diags);
        let values: Vec<i64> = split_top_level(&args, ',')
            .iter()
            .map(|a| parse_int_arg(a, ctx, diags))
            .collect();
        let result = eval_math(name, &values, ctx, diags);
        out.replace_range(start..=close, &result.to_string());
    }
}

fn parse_int_arg(arg: &str, ctx: &SubstContext, diags: &mut Diagnostics) -> i64 {
    let arg = arg.trim();
    match arg.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            diags.warning(
                Category::TemplateSyntax,
                ctx.file,
                ctx.line,
                format!("non-integer argument '{arg}' in arithmetic expression"),
            );
            0
        }
    }
}

fn eval_math(name: &str, args: &[i64], ctx: &SubstContext, diags: &mut Diagnostics) -> i64 {
    let a = args.first().copied().unwrap_or(0);
    let b = args.get(1).copied().unwrap_or(0);
    match name {
        "add" => a.wrapping_add(b),
        "sub" => a.wrapping_sub(b),
        "mul" => a.wrapping_mul(b),
        "div" | "mod" if b == 0 => {
            diags.warning(
                Category::TemplateSyntax,
                ctx.file,
                ctx.line,
                format!("{name}() by zero; using 0"),
            );
            0
        }
        "div" => a / b,
        "mod" => a % b,
        _ => 0,
    }
}

/// Finds the leftmost `add(`/`sub(`/... call, returning the name start and
/// the offset of its opening paren.
fn find_math_call(s: &str) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    for func in MATH_FUNCS {
        let mut search = 0;
        while let Some(found) = s[search..].find(func) {
            let start = search + found;
            let end = start + func.len();
            let prev_ok = start == 0 || {
                let p = bytes[start - 1];
                !(p.is_ascii_alphanumeric() || p == b'_' || p == b'.')
            };
            if prev_ok && bytes.get(end) == Some(&b'(') {
                return Some((start, end));
            }
            search = end;
        }
    }
    None
}

fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in s.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                out.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// Classifies a substituted signal expression into the special values.
pub(crate) fn classify(signal: &str) -> SignalValue {
    match signal.trim() {
        "" | "_" => SignalValue::Unconnected,
        "'0" | "0" => SignalValue::Constant(ConstKind::Zero),
        "'1" | "1" => SignalValue::Constant(ConstKind::One),
        "'z" | "z" | "'Z" | "Z" => SignalValue::Constant(ConstKind::Z),
        "'x" | "x" | "'X" | "X" => SignalValue::Constant(ConstKind::X),
        other => SignalValue::Expr(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, dir: PortDir, width: usize) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            dir,
            width,
            range_str: None,
        }
    }

    fn template(instance_pattern: &str, rules: &[(&str, &str)]) -> AutoTemplate {
        AutoTemplate {
            module_name: "sub".to_string(),
            instance_pattern: instance_pattern.to_string(),
            rules: rules
                .iter()
                .map(|(p, s)| crate::template::TemplateRule {
                    port_pattern: p.to_string(),
                    signal_expr: s.to_string(),
                })
                .collect(),
            line_number: 1,
        }
    }

    fn resolve(t: Option<&AutoTemplate>, instance: &str, port: &PortInfo) -> ResolvedSignal {
        let mut diags = Diagnostics::new();
        resolve_signal(t, instance, port, Path::new("t.sv"), 1, &mut diags)
    }

    #[test]
    fn no_template_passes_name_through() {
        let r = resolve(None, "u0", &port("din", PortDir::Input, 8));
        assert_eq!(r.value, SignalValue::Expr("din".to_string()));
        assert_eq!(r.matched_rule, None);
    }

    #[test]
    fn default_instance_numbering() {
        let t = template("", &[("din", "fifo_@_din")]);
        let r = resolve(Some(&t), "u_fifo_3", &port("din", PortDir::Input, 8));
        assert_eq!(r.value, SignalValue::Expr("fifo_3_din".to_string()));
        assert_eq!(r.matched_rule, Some(0));
    }

    #[test]
    fn explicit_instance_pattern() {
        let t = template(r"u_fifo_(\d+)", &[("din", "fifo_%1_din")]);
        let r = resolve(Some(&t), "u_fifo_0", &port("din", PortDir::Input, 8));
        assert_eq!(r.value, SignalValue::Expr("fifo_0_din".to_string()));
    }

    #[test]
    fn port_capture_groups() {
        let t = template("", &[(r"axi_(.*)", r"m_axi_$1")]);
        let r = resolve(Some(&t), "u0", &port("axi_wdata", PortDir::Input, 32));
        assert_eq!(r.value, SignalValue::Expr("m_axi_wdata".to_string()));
    }

    #[test]
    fn unmatched_port_falls_through() {
        let t = template("", &[("din", "x")]);
        let r = resolve(Some(&t), "u0", &port("dout", PortDir::Output, 8));
        assert_eq!(r.value, SignalValue::Expr("dout".to_string()));
        assert_eq!(r.matched_rule, None);
    }

    #[test]
    fn port_patterns_are_anchored() {
        let t = template("", &[("din", "x")]);
        let r = resolve(Some(&t), "u0", &port("din2", PortDir::Input, 1));
        assert_eq!(r.matched_rule, None);
    }

    #[test]
    fn port_variables() {
        let t = template("", &[(".*", "port.name_w{port.width}")]);
        let r = resolve(Some(&t), "u0", &port("req", PortDir::Input, 4));
        assert_eq!(r.value, SignalValue::Expr("req_w{4}".to_string()));
    }

    #[test]
    fn inst_name_variable() {
        let t = template("", &[(".*", "inst.name_sig")]);
        let r = resolve(Some(&t), "u_core", &port("a", PortDir::Input, 1));
        assert_eq!(r.value, SignalValue::Expr("u_core_sig".to_string()));
    }

    #[test]
    fn direction_ternary() {
        let t = template("", &[(".*", "port.output ? out_bus : in_bus")]);
        let r = resolve(Some(&t), "u0", &port("q", PortDir::Output, 1));
        assert_eq!(r.value, SignalValue::Expr("out_bus".to_string()));
        let r = resolve(Some(&t), "u0", &port("d", PortDir::Input, 1));
        assert_eq!(r.value, SignalValue::Expr("in_bus".to_string()));
    }

    #[test]
    fn arithmetic_functions() {
        let t = template("", &[(".*", "bus[sub(port.width,1):0]")]);
        let r = resolve(Some(&t), "u0", &port("d", PortDir::Input, 8));
        assert_eq!(r.value, SignalValue::Expr("bus[7:0]".to_string()));
    }

    #[test]
    fn nested_arithmetic() {
        let t = template("", &[(".*", "x[add(mul(2,3),1)]")]);
        let r = resolve(Some(&t), "u0", &port("d", PortDir::Input, 1));
        assert_eq!(r.value, SignalValue::Expr("x[7]".to_string()));
    }

    #[test]
    fn identifier_prefix_is_not_a_math_call() {
        let t = template("", &[(".*", "my_add(2,3)")]);
        let r = resolve(Some(&t), "u0", &port("d", PortDir::Input, 1));
        assert_eq!(r.value, SignalValue::Expr("my_add(2,3)".to_string()));
    }

    #[test]
    fn division_by_zero_warns() {
        let t = template("", &[(".*", "div(4,0)")]);
        let mut diags = Diagnostics::new();
        let r = resolve_signal(
            Some(&t),
            "u0",
            &port("d", PortDir::Input, 1),
            Path::new("t.sv"),
            1,
            &mut diags,
        );
        assert_eq!(r.value, SignalValue::Constant(ConstKind::Zero));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn special_values() {
        assert_eq!(classify("_"), SignalValue::Unconnected);
        assert_eq!(classify(""), SignalValue::Unconnected);
        assert_eq!(classify("'0"), SignalValue::Constant(ConstKind::Zero));
        assert_eq!(classify("1"), SignalValue::Constant(ConstKind::One));
        assert_eq!(classify("'z"), SignalValue::Constant(ConstKind::Z));
        assert_eq!(classify("x"), SignalValue::Constant(ConstKind::X));
        assert_eq!(classify("data"), SignalValue::Expr("data".to_string()));
    }

    #[test]
    fn constant_to_output_warns() {
        let t = template("", &[(".*", "'0")]);
        let mut diags = Diagnostics::new();
        let r = resolve_signal(
            Some(&t),
            "u0",
            &port("q", PortDir::Output, 1),
            Path::new("t.sv"),
            1,
            &mut diags,
        );
        assert_eq!(r.value, SignalValue::Constant(ConstKind::Zero));
        assert_eq!(diags.len(), 1);
        assert!(diags.iter().next().unwrap().message.contains("constant"));
    }

    #[test]
    fn invalid_port_pattern_skips_rule() {
        let t = template("", &[("([", "x"), (".*", "y")]);
        let mut diags = Diagnostics::new();
        let r = resolve_signal(
            Some(&t),
            "u0",
            &port("d", PortDir::Input, 1),
            Path::new("t.sv"),
            1,
            &mut diags,
        );
        assert_eq!(r.value, SignalValue::Expr("y".to_string()));
        assert_eq!(r.matched_rule, Some(1));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn format_constants() {
        assert_eq!(format_constant(ConstKind::Zero, 1), "1'b0");
        assert_eq!(format_constant(ConstKind::Zero, 8), "8'b0");
        assert_eq!(format_constant(ConstKind::One, 1), "1'b1");
        assert_eq!(format_constant(ConstKind::Z, 4), "4'bz");
    }
}
