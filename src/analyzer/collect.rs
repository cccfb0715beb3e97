// SPDX-License-Identifier: Apache-2.0

//! The collect pass: one walk over the syntax tree gathering everything the
//! later passes need, with all positions mapped back to byte offsets in the
//! original buffer.

use indexmap::IndexSet;
use std::path::Path;
use sv_parser::{RefNode, SyntaxTree, unwrap_node};

use crate::diag::{Category, Diagnostics};
use crate::syntax::{self, CommentSite};
use crate::template::{self, AutoTemplate, DeclKeyword, FENCE_BEGIN, FENCE_END};
use crate::util;

/// Everything found in one source file.
#[derive(Debug, Default)]
pub(crate) struct FileIndex {
    pub templates: Vec<AutoTemplate>,
    pub modules: Vec<ModuleScope>,
}

/// One module declaration and the AUTO-relevant facts inside it.
#[derive(Debug)]
pub(crate) struct ModuleScope {
    pub name: String,
    pub span: (usize, usize),
    pub ansi: bool,
    /// Offset of the `)` closing the ANSI header port list.
    pub header_close: Option<usize>,
    /// `(name, offset)` of every ANSI header port, in order.
    pub header_ports: Vec<(String, usize)>,
    /// Leading whitespace of the `module` keyword's line.
    pub header_indent: String,
    pub instances: Vec<InstanceSite>,
    /// Net and variable names declared by the user outside any fence.
    pub user_decls: IndexSet<String>,
    pub logic_markers: Vec<LogicMarker>,
    pub ports_marker: Option<PortsMarker>,
}

impl ModuleScope {
    /// Whether any expansion work exists for this module. Modules without
    /// markers are never touched and never diagnosed.
    pub fn has_auto_work(&self) -> bool {
        self.ports_marker.is_some()
            || !self.logic_markers.is_empty()
            || self.instances.iter().any(|i| i.marker.is_some())
    }
}

/// One hierarchical instance.
#[derive(Debug)]
pub(crate) struct InstanceSite {
    pub module_type: String,
    pub instance_name: String,
    /// 1-based line of the instance, used for template association.
    pub line: usize,
    /// Offset of the `)` closing the connection list.
    pub close_paren: usize,
    pub connections: Vec<ManualConnection>,
    /// Expression texts of positional connections, in port order.
    pub ordered_exprs: Vec<String>,
    pub marker: Option<InstMarker>,
    /// Leading whitespace of the instantiation statement's line.
    pub indent: String,
}

/// One named connection written by the user (or left over from a previous
/// expansion; the resolve pass tells those apart by offset).
#[derive(Debug)]
pub(crate) struct ManualConnection {
    pub port: String,
    /// Text between the connection parens; `None` for `.port ()`. The
    /// shorthand `.port` form carries the port name itself.
    pub expr: Option<String>,
    pub offset: usize,
}

/// An `/*AUTOINST*/` marker inside an instance's connection list.
#[derive(Debug)]
pub(crate) struct InstMarker {
    pub start: usize,
    pub end: usize,
    pub filter: Option<String>,
}

/// An `/*AUTOLOGIC*/` (or alias) marker.
#[derive(Debug)]
pub(crate) struct LogicMarker {
    pub end: usize,
    pub keyword: DeclKeyword,
    pub indent: String,
    /// Span of a previously generated fence directly below the marker:
    /// from the start of the begin-fence line to one past the end fence.
    pub fence: Option<(usize, usize)>,
}

/// An `/*AUTOPORTS*/` marker inside an ANSI header.
#[derive(Debug)]
pub(crate) struct PortsMarker {
    pub start: usize,
    pub end: usize,
}

pub(crate) fn collect(
    tree: &SyntaxTree,
    text: &str,
    path: &Path,
    diags: &mut Diagnostics,
) -> FileIndex {
    let comments = syntax::comments(tree, path);

    let mut templates = Vec::new();
    for c in &comments {
        if !c.text.starts_with("/*") || !c.text.contains(template::AUTO_TEMPLATE) {
            continue;
        }
        let line = util::line_at(text, c.start);
        if let Some(t) = template::parse_template_comment(&c.text, line, path, diags) {
            log::debug!(
                "template for '{}' at line {} with {} rules",
                t.module_name,
                t.line_number,
                t.rules.len()
            );
            templates.push(t);
        }
    }

    let mut modules = Vec::new();
    for node in tree {
        match node {
            RefNode::ModuleDeclarationAnsi(decl) => {
                if let Some(m) = collect_module(tree, decl.into(), true, text, path, &comments, diags)
                {
                    modules.push(m);
                }
            }
            RefNode::ModuleDeclarationNonansi(decl) => {
                if let Some(m) =
                    collect_module(tree, decl.into(), false, text, path, &comments, diags)
                {
                    modules.push(m);
                }
            }
            _ => {}
        }
    }

    FileIndex { templates, modules }
}

fn collect_module(
    tree: &SyntaxTree,
    decl: RefNode,
    ansi: bool,
    text: &str,
    path: &Path,
    comments: &[CommentSite],
    diags: &mut Diagnostics,
) -> Option<ModuleScope> {
    let name = syntax::identifier_text(tree, unwrap_node!(decl.clone(), ModuleIdentifier)?)?;
    let span = syntax::node_span(tree, decl.clone(), path)?;
    let header_indent = util::indent_at(text, span.0).to_string();

    let mut header_close = None;
    let mut header_ports = Vec::new();
    if ansi {
        for node in decl.clone() {
            if let RefNode::ListOfPortDeclarations(list) = node {
                let list_node: RefNode = list.into();
                header_close = syntax::last_close_paren(tree, list_node.clone(), path);
                for sub in list_node {
                    if let RefNode::AnsiPortDeclaration(port) = sub {
                        let Some(port_id) = unwrap_node!(port, PortIdentifier) else {
                            continue;
                        };
                        let Some(pname) = syntax::identifier_text(tree, port_id.clone()) else {
                            continue;
                        };
                        let Some(offset) = syntax::identifier_offset(tree, port_id, path) else {
                            continue;
                        };
                        header_ports.push((pname, offset));
                    }
                }
                break;
            }
        }
    }

    let module_comments: Vec<&CommentSite> = comments
        .iter()
        .filter(|c| c.contained_in(span))
        .collect();

    // AUTOLOGIC markers first: their fences bound what counts as a user
    // declaration below.
    let mut logic_markers = Vec::new();
    let marker_starts: Vec<usize> = module_comments
        .iter()
        .filter(|c| template::autologic_marker(&c.text).is_some())
        .map(|c| c.start)
        .collect();
    for c in &module_comments {
        let Some(keyword) = template::autologic_marker(&c.text) else {
            continue;
        };
        let limit = marker_starts
            .iter()
            .copied()
            .filter(|&s| s > c.end)
            .min()
            .unwrap_or(span.1)
            .min(text.len());
        logic_markers.push(LogicMarker {
            end: c.end,
            keyword,
            indent: util::indent_at(text, c.start).to_string(),
            fence: find_fence(text, c.end, limit),
        });
    }

    let mut ports_marker = None;
    for c in &module_comments {
        if !template::autoports_marker(&c.text) {
            continue;
        }
        match header_close {
            Some(close) if ansi && c.end <= close => {
                ports_marker = Some(PortsMarker {
                    start: c.start,
                    end: c.end,
                });
                break;
            }
            _ => {
                diags.warning(
                    Category::TemplateSyntax,
                    path,
                    util::line_at(text, c.start),
                    format!(
                        "module '{name}' has /*AUTOPORTS*/ outside an ANSI port header; skipped"
                    ),
                );
            }
        }
    }

    let fences: Vec<(usize, usize)> = logic_markers.iter().filter_map(|m| m.fence).collect();

    let mut user_decls = IndexSet::new();
    for node in decl.clone() {
        match &node {
            RefNode::NetDeclaration(_) | RefNode::DataDeclaration(_) => {}
            _ => continue,
        }
        let Some(decl_span) = syntax::node_span(tree, node.clone(), path) else {
            continue;
        };
        if fences.iter().any(|f| f.0 <= decl_span.0 && decl_span.0 < f.1) {
            continue;
        }
        for sub in node {
            match sub {
                RefNode::VariableIdentifier(_) | RefNode::NetIdentifier(_) => {
                    if let Some(dname) = syntax::identifier_text(tree, sub) {
                        user_decls.insert(dname);
                    }
                }
                _ => {}
            }
        }
    }

    let mut instances = Vec::new();
    for node in decl {
        let RefNode::ModuleInstantiation(mi) = node else {
            continue;
        };
        let mi_node: RefNode = mi.into();
        let Some(module_type) = unwrap_node!(mi_node.clone(), ModuleIdentifier)
            .and_then(|n| syntax::identifier_text(tree, n))
        else {
            continue;
        };
        let Some(mi_span) = syntax::node_span(tree, mi_node.clone(), path) else {
            continue;
        };
        let indent = util::indent_at(text, mi_span.0).to_string();

        for sub in mi_node {
            let RefNode::HierarchicalInstance(hi) = sub else {
                continue;
            };
            if let Some(site) = collect_instance(
                tree,
                hi.into(),
                &module_type,
                &indent,
                text,
                path,
                comments,
            ) {
                instances.push(site);
            }
        }
    }

    Some(ModuleScope {
        name,
        span,
        ansi,
        header_close,
        header_ports,
        header_indent,
        instances,
        user_decls,
        logic_markers,
        ports_marker,
    })
}

fn collect_instance(
    tree: &SyntaxTree,
    hi: RefNode,
    module_type: &str,
    indent: &str,
    text: &str,
    path: &Path,
    comments: &[CommentSite],
) -> Option<InstanceSite> {
    let instance_name =
        syntax::identifier_text(tree, unwrap_node!(hi.clone(), InstanceIdentifier)?)?;
    let span = syntax::node_span(tree, hi.clone(), path)?;
    let close_paren = syntax::last_close_paren(tree, hi.clone(), path)?;
    let line = util::line_at(text, span.0);

    let mut connections = Vec::new();
    let mut ordered_exprs = Vec::new();
    for node in hi {
        match node {
            RefNode::NamedPortConnection(npc) => {
                let Some(port) =
                    unwrap_node!(npc, PortIdentifier).and_then(|n| syntax::identifier_text(tree, n))
                else {
                    continue;
                };
                let Some(npc_span) = syntax::node_span(tree, npc.into(), path) else {
                    continue;
                };
                let expr = connection_expr(tree, npc.into(), &port, text, path);
                connections.push(ManualConnection {
                    port,
                    expr,
                    offset: npc_span.0,
                });
            }
            RefNode::OrderedPortConnection(opc) => {
                if let Some(opc_span) = syntax::node_span(tree, opc.into(), path) {
                    ordered_exprs.push(text[opc_span.0..opc_span.1].trim().to_string());
                }
            }
            _ => {}
        }
    }

    let mut marker = None;
    for c in comments {
        // Only markers inside the connection parens count; a comment in the
        // trivia after the closing paren belongs to the statement.
        if !c.contained_in(span) || c.end > close_paren {
            continue;
        }
        if let Some(filter) = template::autoinst_marker(&c.text) {
            marker = Some(InstMarker {
                start: c.start,
                end: c.end,
                filter,
            });
            break;
        }
    }

    Some(InstanceSite {
        module_type: module_type.to_string(),
        instance_name,
        line,
        close_paren,
        connections,
        ordered_exprs,
        marker,
        indent: indent.to_string(),
    })
}

/// Extracts the text between the parens of a named connection. `.port` with
/// no parens is shorthand for `.port (port)`; empty parens mean explicitly
/// unconnected.
fn connection_expr(
    tree: &SyntaxTree,
    npc: RefNode,
    port: &str,
    text: &str,
    path: &Path,
) -> Option<String> {
    let mut open = None;
    let mut close = None;
    for locate in syntax::locates(npc) {
        match tree.get_str(locate) {
            Some("(") => {
                if open.is_none() {
                    open = syntax::main_offset(tree, locate, path);
                }
            }
            Some(")") => {
                if let Some(offset) = syntax::main_offset(tree, locate, path) {
                    close = Some(close.map_or(offset, |c: usize| c.max(offset)));
                }
            }
            _ => {}
        }
    }
    match (open, close) {
        (Some(o), Some(c)) if c > o => {
            let inner = text[o + 1..c].trim();
            if inner.is_empty() {
                None
            } else {
                Some(inner.to_string())
            }
        }
        _ => Some(port.to_string()),
    }
}

/// Looks for a previously generated fence directly below a marker. Anything
/// other than whitespace between the marker and the begin fence means the
/// fence belongs to something else.
fn find_fence(text: &str, from: usize, limit: usize) -> Option<(usize, usize)> {
    let limit = limit.clamp(from, text.len());
    let window = &text[from..limit];
    let begin_rel = window.find(FENCE_BEGIN)?;
    if !window[..begin_rel].chars().all(char::is_whitespace) {
        return None;
    }
    let begin = from + begin_rel;
    let end_rel = window[begin_rel..].find(FENCE_END)?;
    let end = begin + end_rel + FENCE_END.len();
    let line_start = util::line_start_at(text, begin).max(from);
    Some((line_start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use sv_parser::parse_sv_str;

    fn index_of(src: &str) -> FileIndex {
        let main = Path::new("test.sv");
        let (tree, _) = parse_sv_str(src, main, &HashMap::new(), &[] as &[&Path], false, false)
            .expect("test source must parse");
        let mut diags = Diagnostics::new();
        collect(&tree, src, main, &mut diags)
    }

    #[test]
    fn finds_instance_and_marker() {
        let src = "\
module top;
  fifo u_fifo_0 (
    .clk(clk),
    /*AUTOINST*/
  );
endmodule
";
        let index = index_of(src);
        assert_eq!(index.modules.len(), 1);
        let module = &index.modules[0];
        assert_eq!(module.name, "top");
        assert_eq!(module.instances.len(), 1);
        let inst = &module.instances[0];
        assert_eq!(inst.module_type, "fifo");
        assert_eq!(inst.instance_name, "u_fifo_0");
        assert_eq!(inst.indent, "  ");
        assert_eq!(inst.connections.len(), 1);
        assert_eq!(inst.connections[0].port, "clk");
        assert_eq!(inst.connections[0].expr.as_deref(), Some("clk"));
        let marker = inst.marker.as_ref().unwrap();
        assert_eq!(&src[marker.start..marker.end], "/*AUTOINST*/");
        assert!(marker.start > inst.connections[0].offset);
        assert_eq!(&src[inst.close_paren..inst.close_paren + 1], ")");
    }

    #[test]
    fn shorthand_and_unconnected() {
        let src = "\
module top;
  sub u0 (.clk, .unused(), .d(sig[3:0]));
endmodule
";
        let index = index_of(src);
        let inst = &index.modules[0].instances[0];
        assert_eq!(inst.connections[0].expr.as_deref(), Some("clk"));
        assert_eq!(inst.connections[1].expr, None);
        assert_eq!(inst.connections[2].expr.as_deref(), Some("sig[3:0]"));
    }

    #[test]
    fn autologic_marker_without_fence() {
        let src = "\
module top;
  /*AUTOLOGIC*/
  sub u0 (.a(x));
endmodule
";
        let index = index_of(src);
        let module = &index.modules[0];
        assert_eq!(module.logic_markers.len(), 1);
        let marker = &module.logic_markers[0];
        assert_eq!(marker.keyword, DeclKeyword::Logic);
        assert_eq!(marker.indent, "  ");
        assert_eq!(marker.fence, None);
        assert_eq!(&src[..marker.end], "module top;\n  /*AUTOLOGIC*/");
    }

    #[test]
    fn autologic_fence_detected() {
        let src = "\
module top;
  /*AUTOLOGIC*/
  // Beginning of automatic logic
  logic [7:0] data;
  // End of automatics
  sub u0 (.a(x));
endmodule
";
        let index = index_of(src);
        let marker = &index.modules[0].logic_markers[0];
        let (start, end) = marker.fence.unwrap();
        assert!(src[start..end].starts_with("  // Beginning of automatic logic"));
        assert!(src[start..end].ends_with(FENCE_END));
        // The declaration inside the fence is not a user declaration.
        assert!(!index.modules[0].user_decls.contains("data"));
    }

    #[test]
    fn user_declarations_outside_fence() {
        let src = "\
module top;
  logic [3:0] user_sig;
  wire other;
  /*AUTOLOGIC*/
  sub u0 (.a(x));
endmodule
";
        let index = index_of(src);
        let module = &index.modules[0];
        assert!(module.user_decls.contains("user_sig"));
        assert!(module.user_decls.contains("other"));
    }

    #[test]
    fn autoports_marker_in_ansi_header() {
        let src = "\
module top (
  input logic clk,
  /*AUTOPORTS*/
);
endmodule
";
        let index = index_of(src);
        let module = &index.modules[0];
        assert!(module.ansi);
        let marker = module.ports_marker.as_ref().unwrap();
        assert_eq!(&src[marker.start..marker.end], "/*AUTOPORTS*/");
        let close = module.header_close.unwrap();
        assert_eq!(&src[close..close + 2], ");");
        assert_eq!(module.header_ports.len(), 1);
        assert_eq!(module.header_ports[0].0, "clk");
        assert!(module.header_ports[0].1 < marker.start);
    }

    #[test]
    fn autowire_and_autoreg_aliases() {
        let src = "\
module top;
  /*AUTOWIRE*/
  /*AUTOREG*/
endmodule
";
        let index = index_of(src);
        let markers = &index.modules[0].logic_markers;
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].keyword, DeclKeyword::Wire);
        assert_eq!(markers[1].keyword, DeclKeyword::Reg);
    }

    #[test]
    fn template_collected_with_line() {
        let src = "\
module top;
  /* fifo AUTO_TEMPLATE
     din => fifo_din
  */
  fifo u0 (/*AUTOINST*/);
endmodule
";
        let index = index_of(src);
        assert_eq!(index.templates.len(), 1);
        assert_eq!(index.templates[0].line_number, 2);
        assert_eq!(index.modules[0].instances[0].line, 5);
    }

    #[test]
    fn ordered_connections() {
        let src = "\
module top;
  sub u0 (a, b[1:0]);
endmodule
";
        let index = index_of(src);
        let inst = &index.modules[0].instances[0];
        assert!(inst.connections.is_empty());
        assert_eq!(inst.ordered_exprs, vec!["a".to_string(), "b[1:0]".to_string()]);
    }

    #[test]
    fn modules_without_markers_have_no_work() {
        let src = "\
module plain;
  sub u0 (.a(x));
endmodule
";
        let index = index_of(src);
        assert!(!index.modules[0].has_auto_work());
    }
}
