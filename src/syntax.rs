// SPDX-License-Identifier: Apache-2.0

//! Thin helpers over the `sv-parser` concrete syntax tree.
//!
//! Every offset handed out by this module is a byte position in the
//! *original* source file, recovered through [`SyntaxTree::get_origin`], so
//! replacement ranges stay valid against the buffer read from disk even when
//! the preprocessor expanded text in between. Locates that originate from
//! included files or macro bodies are skipped.

use std::collections::HashMap;
use std::path::Path;

use sv_parser::{Define, DefineText, Locate, RefNode, SyntaxTree, unwrap_node};

/// A comment with byte-accurate offsets into the original buffer.
#[derive(Clone, Debug)]
pub(crate) struct CommentSite {
    /// Full comment text, delimiters included.
    pub text: String,
    pub start: usize,
    /// One past the final character of the comment.
    pub end: usize,
}

impl CommentSite {
    pub fn contained_in(&self, span: (usize, usize)) -> bool {
        span.0 <= self.start && self.end <= span.1
    }
}

/// Maps a locate to its byte offset in `main`, or `None` for text that
/// originated elsewhere.
pub(crate) fn main_offset(tree: &SyntaxTree, locate: &Locate, main: &Path) -> Option<usize> {
    let (path, offset) = tree.get_origin(locate)?;
    if path.as_path() == main { Some(offset) } else { None }
}

/// All comments of the file, in source order.
pub(crate) fn comments(tree: &SyntaxTree, main: &Path) -> Vec<CommentSite> {
    let mut out = Vec::new();
    for node in tree {
        if let RefNode::Comment(c) = node {
            let locate = &c.nodes.0;
            let Some(text) = tree.get_str(locate) else {
                continue;
            };
            let Some(start) = main_offset(tree, locate, main) else {
                continue;
            };
            out.push(CommentSite {
                text: text.to_string(),
                start,
                end: start + locate.len,
            });
        }
    }
    out
}

/// All token locates beneath `node`, in source order.
pub(crate) fn locates<'a>(node: RefNode<'a>) -> impl Iterator<Item = &'a Locate> {
    node.into_iter().filter_map(|n| match n {
        RefNode::Locate(l) => Some(l),
        _ => None,
    })
}

/// Byte span covered by `node` in the main file, trailing trivia included.
pub(crate) fn node_span(tree: &SyntaxTree, node: RefNode, main: &Path) -> Option<(usize, usize)> {
    let mut span: Option<(usize, usize)> = None;
    for locate in locates(node) {
        let Some(offset) = main_offset(tree, locate, main) else {
            continue;
        };
        let end = offset + locate.len;
        span = Some(match span {
            None => (offset, end),
            Some((s, e)) => (s.min(offset), e.max(end)),
        });
    }
    span
}

/// Offset of the last `)` token beneath `node`. For a hierarchical instance
/// this is the paren closing its connection list, regardless of any trailing
/// trivia attached after it.
pub(crate) fn last_close_paren(tree: &SyntaxTree, node: RefNode, main: &Path) -> Option<usize> {
    let mut best: Option<usize> = None;
    for locate in locates(node) {
        if tree.get_str(locate) != Some(")") {
            continue;
        }
        if let Some(offset) = main_offset(tree, locate, main) {
            best = Some(best.map_or(offset, |b| b.max(offset)));
        }
    }
    best
}

/// Text of the first simple or escaped identifier beneath `node`.
pub(crate) fn identifier_text(tree: &SyntaxTree, node: RefNode) -> Option<String> {
    match unwrap_node!(node, SimpleIdentifier, EscapedIdentifier) {
        Some(RefNode::SimpleIdentifier(x)) => {
            tree.get_str(&x.nodes.0).map(|s| s.trim().to_string())
        }
        Some(RefNode::EscapedIdentifier(x)) => {
            tree.get_str(&x.nodes.0).map(|s| s.trim().to_string())
        }
        _ => None,
    }
}

/// Offset of the first identifier beneath `node` in the main file.
pub(crate) fn identifier_offset(tree: &SyntaxTree, node: RefNode, main: &Path) -> Option<usize> {
    match unwrap_node!(node, SimpleIdentifier, EscapedIdentifier) {
        Some(RefNode::SimpleIdentifier(x)) => main_offset(tree, &x.nodes.0, main),
        Some(RefNode::EscapedIdentifier(x)) => main_offset(tree, &x.nodes.0, main),
        _ => None,
    }
}

/// Converts `+define+`-style `NAME` / `NAME=VALUE` strings into the
/// preprocessor define table expected by `sv-parser`.
pub(crate) fn sv_defines(defines: &[String]) -> HashMap<String, Option<Define>> {
    defines
        .iter()
        .map(|d| {
            let (name, value) = match d.split_once('=') {
                Some((n, v)) => (n.to_string(), Some(v.to_string())),
                None => (d.clone(), None),
            };
            let text = value.map(|v| DefineText::new(v, None));
            (name.clone(), Some(Define::new(name, Vec::new(), text)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_parser::parse_sv_str;

    fn parse(src: &str) -> SyntaxTree {
        let (tree, _) = parse_sv_str(
            src,
            Path::new("test.sv"),
            &HashMap::new(),
            &[] as &[&Path],
            false,
            false,
        )
        .expect("test source must parse");
        tree
    }

    #[test]
    fn comment_offsets_are_byte_accurate() {
        let src = "module m;\n  /*AUTOLOGIC*/\n  // note\nendmodule\n";
        let tree = parse(src);
        let comments = comments(&tree, Path::new("test.sv"));
        assert_eq!(comments.len(), 2);
        assert_eq!(&src[comments[0].start..comments[0].end], "/*AUTOLOGIC*/");
        assert_eq!(comments[0].text, "/*AUTOLOGIC*/");
        assert!(src[comments[1].start..comments[1].end].starts_with("// note"));
    }

    #[test]
    fn module_span_and_identifier() {
        let src = "module top;\nendmodule\n";
        let tree = parse(src);
        for node in &tree {
            match &node {
                RefNode::ModuleDeclarationNonansi(_) | RefNode::ModuleDeclarationAnsi(_) => {
                    let name =
                        identifier_text(&tree, unwrap_node!(node, ModuleIdentifier).unwrap())
                            .unwrap();
                    assert_eq!(name, "top");
                    return;
                }
                _ => {}
            }
        }
        panic!("no module declaration found");
    }

    #[test]
    fn close_paren_of_instance() {
        let src = "module m;\n  sub u0 (.a(x), .b(y));\nendmodule\n";
        let tree = parse(src);
        for node in &tree {
            if let RefNode::HierarchicalInstance(hi) = node {
                let pos = last_close_paren(&tree, hi.into(), Path::new("test.sv")).unwrap();
                assert_eq!(&src[pos..pos + 1], ")");
                assert_eq!(&src[pos..pos + 2], ");");
                return;
            }
        }
        panic!("no hierarchical instance found");
    }

    #[test]
    fn define_table() {
        let defines = vec!["SIM".to_string(), "WIDTH=8".to_string()];
        let table = sv_defines(&defines);
        assert_eq!(table.len(), 2);
        assert!(table.contains_key("SIM"));
        assert!(table.contains_key("WIDTH"));
    }
}
