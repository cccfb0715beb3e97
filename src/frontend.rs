// SPDX-License-Identifier: Apache-2.0

//! Module port catalogs, populated from two cooperating frontends.
//!
//! The *syntax layer* reads ANSI module headers straight from the parsed
//! input files; it is the only layer that can preserve the original packed
//! range text (`[WIDTH-1:0]`). The *elaborated layer* runs slang over the
//! whole compilation context and overrides widths with resolved values,
//! adding modules that only exist in `-y` libraries. Either layer alone is
//! enough to drive the expansion engine.

use std::path::Path;

use indexmap::IndexMap;
use slang_rs::SlangConfig;
use sv_parser::{RefNode, SyntaxTree, unwrap_node};

use crate::config::Config;
use crate::diag::Error;
use crate::syntax;

/// Direction of a module port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortDir {
    Input,
    Output,
    Inout,
}

impl PortDir {
    pub fn keyword(self) -> &'static str {
        match self {
            PortDir::Input => "input",
            PortDir::Output => "output",
            PortDir::Inout => "inout",
        }
    }
}

/// One port of a target module: direction, bit width (packed dimensions
/// multiplied, never less than 1), and the original packed range text when
/// the declaration was seen in a parsed source file.
#[derive(Clone, Debug)]
pub struct PortInfo {
    pub name: String,
    pub dir: PortDir,
    pub width: usize,
    pub range_str: Option<String>,
}

/// Per-run cache of module name to ordered port list.
#[derive(Clone, Debug, Default)]
pub struct ModuleCatalog {
    modules: IndexMap<String, Vec<PortInfo>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ports: Vec<PortInfo>) {
        self.modules.insert(name.into(), ports);
    }

    pub fn ports(&self, module: &str) -> Option<&[PortInfo]> {
        self.modules.get(module).map(Vec::as_slice)
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Adds every ANSI module header found in `tree`. Existing catalog
    /// entries for the same module name are left untouched.
    pub(crate) fn add_from_syntax(&mut self, tree: &SyntaxTree, text: &str, main: &Path) {
        for node in tree {
            let RefNode::ModuleDeclarationAnsi(decl) = node else {
                continue;
            };
            let Some(name) =
                unwrap_node!(decl, ModuleIdentifier).and_then(|n| syntax::identifier_text(tree, n))
            else {
                continue;
            };
            if self.modules.contains_key(&name) {
                continue;
            }
            let ports = header_ports(tree, decl.into(), text, main);
            log::debug!("syntax layer: module {name} with {} ports", ports.len());
            self.modules.insert(name, ports);
        }
    }

    /// Runs slang over the full compilation context and overlays resolved
    /// widths onto the catalog. Range text captured by the syntax layer is
    /// kept; widths and module/port order come from elaboration.
    pub fn overlay_elaborated(&mut self, frontend: &FrontendConfig) -> Result<(), Error> {
        let sources: Vec<&str> = frontend.sources.iter().map(String::as_str).collect();
        let incdirs: Vec<&str> = frontend.incdirs.iter().map(String::as_str).collect();
        let libdirs: Vec<&str> = frontend.libdirs.iter().map(String::as_str).collect();
        let libexts: Vec<&str> = frontend.libexts.iter().map(String::as_str).collect();
        let defines: Vec<(&str, &str)> = frontend
            .defines
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let cfg = SlangConfig {
            sources: &sources,
            tops: &[],
            incdirs: &incdirs,
            defines: &defines,
            parameters: &[],
            libfiles: &[],
            libdirs: &libdirs,
            libexts: &libexts,
            ignore_unknown_modules: true,
            ignore_protected: true,
            timescale: None,
            extra_arguments: &[],
        };

        let value = slang_rs::run_slang(&cfg).map_err(|e| Error::Frontend(e.to_string()))?;
        let parser_ports = slang_rs::extract_ports_from_value(&value, true);

        for (module, ports) in parser_ports {
            let elaborated: Vec<PortInfo> = ports
                .iter()
                .filter_map(|p| port_info_from_slang(&module, p))
                .collect();
            match self.modules.get(&module) {
                Some(existing) => {
                    let merged = elaborated
                        .into_iter()
                        .map(|mut port| {
                            if let Some(prior) = existing.iter().find(|p| p.name == port.name) {
                                port.range_str = prior.range_str.clone();
                            }
                            port
                        })
                        .collect();
                    self.modules.insert(module, merged);
                }
                None => {
                    log::debug!("elaborated layer: library module {module}");
                    self.modules.insert(module, elaborated);
                }
            }
        }
        Ok(())
    }
}

fn port_info_from_slang(module: &str, port: &slang_rs::Port) -> Option<PortInfo> {
    let dir = match port.dir {
        slang_rs::PortDir::Input => PortDir::Input,
        slang_rs::PortDir::Output => PortDir::Output,
        slang_rs::PortDir::InOut => PortDir::Inout,
    };
    let width = match port.ty.width() {
        Ok(w) => w.max(1),
        Err(e) => {
            log::debug!("skipping unsupported port {module}.{}: {e}", port.name);
            return None;
        }
    };
    Some(PortInfo {
        name: port.name.clone(),
        dir,
        width,
        range_str: None,
    })
}

/// Extracts the ANSI header ports of one module declaration. Ports that
/// omit a direction or type inherit them from the previous entry, following
/// the ANSI carry-over rule.
fn header_ports(tree: &SyntaxTree, module: RefNode, text: &str, main: &Path) -> Vec<PortInfo> {
    let mut ports = Vec::new();
    let mut carry_dir = PortDir::Input;
    let mut carry_width = 1usize;
    let mut carry_range: Option<String> = None;

    for node in module {
        let RefNode::AnsiPortDeclaration(decl) = node else {
            continue;
        };
        let Some(name) =
            unwrap_node!(decl, PortIdentifier).and_then(|n| syntax::identifier_text(tree, n))
        else {
            continue;
        };

        let dir = unwrap_node!(decl, PortDirection).map(|n| match n {
            RefNode::PortDirection(d) => match d {
                sv_parser::PortDirection::Input(_) => PortDir::Input,
                sv_parser::PortDirection::Output(_) => PortDir::Output,
                sv_parser::PortDirection::Inout(_) => PortDir::Inout,
                sv_parser::PortDirection::Ref(_) => PortDir::Inout,
            },
            _ => PortDir::Input,
        });

        let (width, range_str) = packed_range(tree, decl.into(), text, main);

        // A bare identifier in the list inherits the whole previous header.
        let bare = dir.is_none() && range_str.is_none() && !has_data_type(decl.into());
        let (dir, width, range_str) = if bare {
            (carry_dir, carry_width, carry_range.clone())
        } else {
            (dir.unwrap_or(carry_dir), width, range_str)
        };

        carry_dir = dir;
        carry_width = width;
        carry_range = range_str.clone();

        ports.push(PortInfo {
            name,
            dir,
            width,
            range_str,
        });
    }
    ports
}

fn has_data_type(decl: RefNode) -> bool {
    decl.into_iter()
        .any(|n| matches!(n, RefNode::DataType(_) | RefNode::NetType(_)))
}

/// Collects the packed dimensions of one port declaration: total width
/// (product of dimension widths whose bounds are integer constants) and the
/// original range text.
fn packed_range(
    tree: &SyntaxTree,
    decl: RefNode,
    text: &str,
    main: &Path,
) -> (usize, Option<String>) {
    let mut width = 1usize;
    let mut range_text = String::new();
    let mut seen = false;

    for node in decl {
        let RefNode::PackedDimension(pd) = node else {
            continue;
        };
        let Some(span) = syntax::node_span(tree, pd.into(), main) else {
            continue;
        };
        let raw = text[span.0..span.1].trim();
        // The span may drag in trivia attached to the closing bracket.
        let dim = match raw.rfind(']') {
            Some(p) => &raw[..=p],
            None => raw,
        };
        seen = true;
        range_text.push_str(dim);
        if let Some(w) = eval_packed_dimension(dim) {
            width = width.saturating_mul(w);
        }
    }

    if seen {
        (width.max(1), Some(range_text))
    } else {
        (1, None)
    }
}

/// Evaluates `[msb:lsb]` when both bounds are integer constant expressions.
fn eval_packed_dimension(dim: &str) -> Option<usize> {
    let inner = dim.strip_prefix('[')?.strip_suffix(']')?;
    let colon = top_level_colon(inner)?;
    let msb = eval_const_expr(&inner[..colon])?;
    let lsb = eval_const_expr(&inner[colon + 1..])?;
    Some(msb.abs_diff(lsb) as usize + 1)
}

fn top_level_colon(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Evaluates integer constant expressions built from decimal literals,
/// `+ - * / %`, unary minus, and parentheses. Anything else (parameters,
/// function calls) yields `None`; the elaborated layer supplies the width in
/// that case.
pub(crate) fn eval_const_expr(s: &str) -> Option<i64> {
    let tokens = tokenize_const(s)?;
    let mut pos = 0;
    let value = parse_sum(&tokens, &mut pos)?;
    if pos == tokens.len() { Some(value) } else { None }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ConstToken {
    Num(i64),
    Op(char),
}

fn tokenize_const(s: &str) -> Option<Vec<ConstToken>> {
    let mut tokens = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '0'..='9' => {
                let mut end = i;
                while let Some(&(j, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '_' {
                        end = j + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let digits: String = s[i..end].chars().filter(|&d| d != '_').collect();
                tokens.push(ConstToken::Num(digits.parse().ok()?));
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' => {
                tokens.push(ConstToken::Op(c));
                chars.next();
            }
            _ => return None,
        }
    }
    Some(tokens)
}

fn parse_sum(tokens: &[ConstToken], pos: &mut usize) -> Option<i64> {
    let mut value = parse_product(tokens, pos)?;
    while let Some(ConstToken::Op(op @ ('+' | '-'))) = tokens.get(*pos) {
        let op = *op;
        *pos += 1;
        let rhs = parse_product(tokens, pos)?;
        value = if op == '+' { value + rhs } else { value - rhs };
    }
    Some(value)
}

fn parse_product(tokens: &[ConstToken], pos: &mut usize) -> Option<i64> {
    let mut value = parse_atom(tokens, pos)?;
    while let Some(ConstToken::Op(op @ ('*' | '/' | '%'))) = tokens.get(*pos) {
        let op = *op;
        *pos += 1;
        let rhs = parse_atom(tokens, pos)?;
        value = match op {
            '*' => value * rhs,
            '/' => value.checked_div(rhs)?,
            _ => value.checked_rem(rhs)?,
        };
    }
    Some(value)
}

fn parse_atom(tokens: &[ConstToken], pos: &mut usize) -> Option<i64> {
    match tokens.get(*pos)? {
        ConstToken::Num(n) => {
            *pos += 1;
            Some(*n)
        }
        ConstToken::Op('-') => {
            *pos += 1;
            Some(-parse_atom(tokens, pos)?)
        }
        ConstToken::Op('(') => {
            *pos += 1;
            let value = parse_sum(tokens, pos)?;
            match tokens.get(*pos) {
                Some(ConstToken::Op(')')) => {
                    *pos += 1;
                    Some(value)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Compilation context handed to the elaborated frontend.
#[derive(Clone, Debug, Default)]
pub struct FrontendConfig {
    pub sources: Vec<String>,
    pub incdirs: Vec<String>,
    pub defines: Vec<(String, String)>,
    pub libdirs: Vec<String>,
    pub libexts: Vec<String>,
}

impl FrontendConfig {
    /// Assembles the frontend context from the resolved configuration and
    /// the positional source files.
    pub fn from_config(config: &Config, sources: &[String]) -> Self {
        let defines = config
            .defines
            .iter()
            .map(|d| match d.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (d.clone(), "1".to_string()),
            })
            .collect();
        FrontendConfig {
            sources: sources.to_vec(),
            incdirs: config.incdirs.clone(),
            defines,
            libdirs: config.libdirs.clone(),
            libexts: config.libext.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use sv_parser::parse_sv_str;

    fn catalog_from(src: &str) -> ModuleCatalog {
        let main = Path::new("test.sv");
        let (tree, _) = parse_sv_str(src, main, &HashMap::new(), &[] as &[&Path], false, false)
            .expect("test source must parse");
        let mut catalog = ModuleCatalog::new();
        catalog.add_from_syntax(&tree, src, main);
        catalog
    }

    #[test]
    fn ansi_header_extraction() {
        let catalog = catalog_from(
            "\
module fifo (
  input logic clk,
  input logic [7:0] din,
  output logic [7:0] dout,
  inout wire [3:0] pad
);
endmodule
",
        );
        let ports = catalog.ports("fifo").unwrap();
        assert_eq!(ports.len(), 4);
        assert_eq!(ports[0].name, "clk");
        assert_eq!(ports[0].dir, PortDir::Input);
        assert_eq!(ports[0].width, 1);
        assert_eq!(ports[0].range_str, None);
        assert_eq!(ports[1].name, "din");
        assert_eq!(ports[1].width, 8);
        assert_eq!(ports[1].range_str.as_deref(), Some("[7:0]"));
        assert_eq!(ports[2].dir, PortDir::Output);
        assert_eq!(ports[3].dir, PortDir::Inout);
        assert_eq!(ports[3].width, 4);
    }

    #[test]
    fn direction_carry_over() {
        let catalog = catalog_from(
            "\
module pair (
  input logic [1:0] a, b,
  output logic y
);
endmodule
",
        );
        let ports = catalog.ports("pair").unwrap();
        assert_eq!(ports[1].name, "b");
        assert_eq!(ports[1].dir, PortDir::Input);
        assert_eq!(ports[1].width, 2);
        assert_eq!(ports[2].dir, PortDir::Output);
    }

    #[test]
    fn parameterized_range_keeps_text() {
        let catalog = catalog_from(
            "\
module wide #(parameter WIDTH = 8) (
  input logic [WIDTH-1:0] data
);
endmodule
",
        );
        let ports = catalog.ports("wide").unwrap();
        assert_eq!(ports[0].range_str.as_deref(), Some("[WIDTH-1:0]"));
        assert_eq!(ports[0].width, 1);
    }

    #[test]
    fn const_expr_eval() {
        assert_eq!(eval_const_expr("7"), Some(7));
        assert_eq!(eval_const_expr("8-1"), Some(7));
        assert_eq!(eval_const_expr("2*4 - 1"), Some(7));
        assert_eq!(eval_const_expr("(3+1)*2"), Some(8));
        assert_eq!(eval_const_expr("-1"), Some(-1));
        assert_eq!(eval_const_expr("WIDTH-1"), None);
        assert_eq!(eval_const_expr("1'b0"), None);
    }

    #[test]
    fn packed_dimension_eval() {
        assert_eq!(eval_packed_dimension("[7:0]"), Some(8));
        assert_eq!(eval_packed_dimension("[0:7]"), Some(8));
        assert_eq!(eval_packed_dimension("[8-1:0]"), Some(8));
        assert_eq!(eval_packed_dimension("[WIDTH-1:0]"), None);
    }
}
