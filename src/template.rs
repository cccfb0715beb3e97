// SPDX-License-Identifier: Apache-2.0

//! `AUTO_TEMPLATE` directive parsing and marker recognition.
//!
//! A template block looks like:
//!
//! ```text
//! /* fifo AUTO_TEMPLATE "u_fifo_(\d+)"
//!    din  => fifo_%1_din,
//!    dout => fifo_%1_dout
//! */
//! ```
//!
//! The header names the target module; the optional quoted string is the
//! instance pattern. Each body line is a `PORT_PATTERN => SIGNAL_EXPR` rule.
//! Malformed lines are dropped one by one with a warning; the template
//! itself survives.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::diag::{Category, Diagnostics};

pub const MARKER_AUTOINST: &str = "/*AUTOINST*/";
pub const MARKER_AUTOLOGIC: &str = "/*AUTOLOGIC*/";
pub const MARKER_AUTOWIRE: &str = "/*AUTOWIRE*/";
pub const MARKER_AUTOREG: &str = "/*AUTOREG*/";
pub const MARKER_AUTOPORTS: &str = "/*AUTOPORTS*/";
pub const AUTO_TEMPLATE: &str = "AUTO_TEMPLATE";
pub const FENCE_BEGIN: &str = "// Beginning of automatic logic";
pub const FENCE_END: &str = "// End of automatics";

/// Declaration keyword emitted inside an automatic-logic fence. `wire` and
/// `reg` come from the deprecated `/*AUTOWIRE*/` and `/*AUTOREG*/` spellings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKeyword {
    Logic,
    Wire,
    Reg,
}

impl DeclKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            DeclKeyword::Logic => "logic",
            DeclKeyword::Wire => "wire",
            DeclKeyword::Reg => "reg",
        }
    }
}

/// One `PORT_PATTERN => SIGNAL_EXPR` rule.
#[derive(Clone, Debug)]
pub struct TemplateRule {
    pub port_pattern: String,
    pub signal_expr: String,
}

/// One parsed `AUTO_TEMPLATE` directive.
#[derive(Clone, Debug)]
pub struct AutoTemplate {
    /// Target module the template applies to.
    pub module_name: String,
    /// Instance-name regex; empty means the default `\d+` numbering rule.
    pub instance_pattern: String,
    pub rules: Vec<TemplateRule>,
    /// 1-based line at which the template comment begins.
    pub line_number: usize,
}

impl AutoTemplate {
    /// A template applies to an instance of `module` when the names match
    /// and the template precedes the instance in the file.
    pub fn applies_to(&self, module: &str, instance_line: usize) -> bool {
        self.module_name == module && self.line_number < instance_line
    }
}

/// Among all applicable templates, the closest preceding one wins.
pub fn select_template<'a>(
    templates: &'a [AutoTemplate],
    module: &str,
    instance_line: usize,
) -> Option<&'a AutoTemplate> {
    templates
        .iter()
        .filter(|t| t.applies_to(module, instance_line))
        .max_by_key(|t| t.line_number)
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*([A-Za-z_][A-Za-z0-9_$]*)\s+AUTO_TEMPLATE\s*(?:"([^"]*)")?\s*\(?\s*$"#)
            .unwrap()
    })
}

/// Parses one block comment as an `AUTO_TEMPLATE` directive. `start_line` is
/// the 1-based line of the comment's opening `/*`. Returns `None` when the
/// comment does not carry a well-formed header.
pub fn parse_template_comment(
    text: &str,
    start_line: usize,
    file: &Path,
    diags: &mut Diagnostics,
) -> Option<AutoTemplate> {
    if !text.contains(AUTO_TEMPLATE) {
        return None;
    }
    let body = text.strip_prefix("/*").unwrap_or(text);
    let body = body.strip_suffix("*/").unwrap_or(body);

    let mut lines = body.lines();
    let header = lines.next().unwrap_or("");
    let Some(caps) = header_re().captures(header) else {
        diags.warning(
            Category::TemplateSyntax,
            file,
            start_line,
            format!("malformed AUTO_TEMPLATE header: {}", header.trim()),
        );
        return None;
    };

    let module_name = caps[1].to_string();
    let instance_pattern = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();

    let mut rules = Vec::new();
    for (i, raw) in lines.enumerate() {
        let line_number = start_line + i + 1;
        // Strip a trailing line comment before looking at the rule.
        let line = match raw.find("//") {
            Some(pos) if raw[..pos].trim().is_empty() => continue,
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() || matches!(line, "(" | ")" | ");" | ")," ) {
            continue;
        }
        let Some((pattern, signal)) = line.split_once("=>") else {
            diags.warning(
                Category::TemplateSyntax,
                file,
                line_number,
                format!("template line is not 'PORT_PATTERN => SIGNAL_EXPR': {line}"),
            );
            continue;
        };
        let port_pattern = pattern.trim().trim_start_matches('.').to_string();
        let signal_expr = signal
            .trim()
            .trim_end_matches([',', ';'])
            .trim()
            .to_string();
        if port_pattern.is_empty() || signal_expr.is_empty() {
            diags.warning(
                Category::TemplateSyntax,
                file,
                line_number,
                format!("template rule with empty pattern or signal: {line}"),
            );
            continue;
        }
        rules.push(TemplateRule {
            port_pattern,
            signal_expr,
        });
    }

    if rules.is_empty() {
        diags.warning(
            Category::TemplateSyntax,
            file,
            start_line,
            format!("AUTO_TEMPLATE for '{module_name}' has no rules"),
        );
    }

    Some(AutoTemplate {
        module_name,
        instance_pattern,
        rules,
        line_number: start_line,
    })
}

fn autoinst_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^/\*\s*AUTOINST\s*(?:\(\s*"([^"]*)"\s*\))?\s*\*/$"#).unwrap()
    })
}

/// Recognizes an `/*AUTOINST*/` marker comment. The outer `Option` is the
/// recognition result; the inner one is the port filter regex from the
/// `/*AUTOINST("...")*/` form.
pub(crate) fn autoinst_marker(text: &str) -> Option<Option<String>> {
    if text == MARKER_AUTOINST {
        return Some(None);
    }
    autoinst_re()
        .captures(text)
        .map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

/// Recognizes `/*AUTOLOGIC*/` and its deprecated aliases, returning the
/// declaration keyword to use.
pub(crate) fn autologic_marker(text: &str) -> Option<DeclKeyword> {
    match text {
        MARKER_AUTOLOGIC => Some(DeclKeyword::Logic),
        MARKER_AUTOWIRE => Some(DeclKeyword::Wire),
        MARKER_AUTOREG => Some(DeclKeyword::Reg),
        _ => None,
    }
}

pub(crate) fn autoports_marker(text: &str) -> bool {
    text == MARKER_AUTOPORTS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (Option<AutoTemplate>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let template = parse_template_comment(text, 10, Path::new("t.sv"), &mut diags);
        (template, diags)
    }

    #[test]
    fn basic_template() {
        let (template, diags) = parse(
            "/* fifo AUTO_TEMPLATE \"u_fifo_(\\d+)\"\n  din => fifo_%1_din\n  dout => fifo_%1_dout\n*/",
        );
        let template = template.unwrap();
        assert!(diags.is_empty());
        assert_eq!(template.module_name, "fifo");
        assert_eq!(template.instance_pattern, "u_fifo_(\\d+)");
        assert_eq!(template.rules.len(), 2);
        assert_eq!(template.rules[0].port_pattern, "din");
        assert_eq!(template.rules[0].signal_expr, "fifo_%1_din");
        assert_eq!(template.line_number, 10);
    }

    #[test]
    fn no_instance_pattern() {
        let (template, _) = parse("/* ram AUTO_TEMPLATE\n  addr => mem_addr,\n*/");
        let template = template.unwrap();
        assert_eq!(template.instance_pattern, "");
        assert_eq!(template.rules[0].signal_expr, "mem_addr");
    }

    #[test]
    fn verilog_mode_style_parens_tolerated() {
        let (template, diags) = parse(
            "/* psm AUTO_TEMPLATE (\n  .ptl_bus => ptl_busnew,\n  );\n*/",
        );
        let template = template.unwrap();
        assert!(diags.is_empty());
        assert_eq!(template.rules.len(), 1);
        assert_eq!(template.rules[0].port_pattern, "ptl_bus");
    }

    #[test]
    fn trailing_comment_stripped() {
        let (template, _) = parse("/* m AUTO_TEMPLATE\n  a => b // connect\n*/");
        assert_eq!(template.unwrap().rules[0].signal_expr, "b");
    }

    #[test]
    fn malformed_line_warns_and_is_dropped() {
        let (template, diags) = parse("/* m AUTO_TEMPLATE\n  not a rule\n  a => b\n*/");
        let template = template.unwrap();
        assert_eq!(template.rules.len(), 1);
        assert_eq!(diags.len(), 1);
        assert!(!diags.has_errors());
    }

    #[test]
    fn empty_template_warns_but_survives() {
        let (template, diags) = parse("/* m AUTO_TEMPLATE\n*/");
        assert!(template.is_some());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn closest_preceding_template_wins() {
        let t1 = AutoTemplate {
            module_name: "fifo".to_string(),
            instance_pattern: String::new(),
            rules: Vec::new(),
            line_number: 5,
        };
        let t2 = AutoTemplate {
            module_name: "fifo".to_string(),
            instance_pattern: String::new(),
            rules: Vec::new(),
            line_number: 20,
        };
        let templates = vec![t1, t2];
        assert_eq!(select_template(&templates, "fifo", 30).unwrap().line_number, 20);
        assert_eq!(select_template(&templates, "fifo", 10).unwrap().line_number, 5);
        assert!(select_template(&templates, "fifo", 3).is_none());
        assert!(select_template(&templates, "ram", 30).is_none());
    }

    #[test]
    fn marker_recognition() {
        assert_eq!(autoinst_marker("/*AUTOINST*/"), Some(None));
        assert_eq!(
            autoinst_marker("/*AUTOINST(\"^axi_\")*/"),
            Some(Some("^axi_".to_string()))
        );
        assert_eq!(autoinst_marker("/*AUTOINSTPARAM*/"), None);
        assert_eq!(autoinst_marker("/* AUTOINST-ish */"), None);
        assert_eq!(autologic_marker("/*AUTOLOGIC*/"), Some(DeclKeyword::Logic));
        assert_eq!(autologic_marker("/*AUTOWIRE*/"), Some(DeclKeyword::Wire));
        assert_eq!(autologic_marker("/*AUTOREG*/"), Some(DeclKeyword::Reg));
        assert!(autoports_marker("/*AUTOPORTS*/"));
        assert!(!autoports_marker("/*AUTOPORTS */"));
    }
}
