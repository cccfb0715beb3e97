// SPDX-License-Identifier: Apache-2.0

//! Per-module signal aggregation.
//!
//! Every connection of every instance in a module is decomposed into bare
//! identifiers and folded into one table. A net consumed by some instance
//! but driven by none must come from outside (external input); a net driven
//! but never consumed leaves the module (external output); a net that is
//! both is internal wiring between instances. Constants and unconnected
//! markers contribute nothing.

use std::sync::OnceLock;

use indexmap::IndexMap;
use itertools::Itertools;
use regex::Regex;

use crate::frontend::{PortDir, PortInfo};

/// Aggregated view of one net within a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetInfo {
    pub name: String,
    /// Maximum width observed across all connections of this net.
    pub width: usize,
    /// Original packed range text, kept only while every observation agreed
    /// on both the text and the width.
    pub range_str: Option<String>,
}

/// One connection that touched a net: which instance and port, and at what
/// width. Widths start at the port width and may later be clamped by the
/// connection generator when it pads a connection.
#[derive(Clone, Debug)]
struct Observation {
    instance: String,
    port: String,
    width: usize,
}

#[derive(Clone, Debug)]
struct NetEntry {
    observations: Vec<Observation>,
    range_str: Option<String>,
    range_width: usize,
    range_conflict: bool,
    driven: bool,
    consumed: bool,
    inout: bool,
}

impl NetEntry {
    fn new() -> Self {
        NetEntry {
            observations: Vec::new(),
            range_str: None,
            range_width: 0,
            range_conflict: false,
            driven: false,
            consumed: false,
            inout: false,
        }
    }

    fn width(&self) -> usize {
        self.observations
            .iter()
            .map(|o| o.width)
            .max()
            .unwrap_or(0)
            .max(1)
    }

    fn info(&self, name: &str) -> NetInfo {
        let width = self.width();
        let range_str = if !self.range_conflict && self.range_width == width {
            self.range_str.clone()
        } else {
            None
        };
        NetInfo {
            name: name.to_string(),
            width,
            range_str,
        }
    }
}

/// Classifies every net touched by the instances of one module.
#[derive(Debug, Default)]
pub struct SignalAggregator {
    nets: IndexMap<String, NetEntry>,
    unused: IndexMap<String, usize>,
}

impl SignalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one resolved connection into the table. Constant expressions
    /// and unconnected markers are skipped entirely.
    pub fn record(&mut self, instance: &str, port: &PortInfo, signal_expr: &str) {
        if is_unconnected_expr(signal_expr) || is_constant_expr(signal_expr) {
            return;
        }
        for ident in extract_identifiers(signal_expr) {
            let entry = self
                .nets
                .entry(ident)
                .or_insert_with(NetEntry::new);
            match port.dir {
                PortDir::Output => entry.driven = true,
                PortDir::Input => entry.consumed = true,
                PortDir::Inout => {
                    entry.driven = true;
                    entry.consumed = true;
                    entry.inout = true;
                }
            }
            if entry.observations.is_empty() {
                entry.range_str = port.range_str.clone();
                entry.range_width = port.width;
            } else if !entry.range_conflict && entry.range_str != port.range_str {
                entry.range_str = None;
                entry.range_conflict = true;
            }
            entry.observations.push(Observation {
                instance: instance.to_string(),
                port: port.name.to_string(),
                width: port.width,
            });
        }
    }

    /// Nets consumed by instances but driven by none: module inputs.
    pub fn external_inputs(&self) -> Vec<NetInfo> {
        self.classified(|e| e.consumed && !e.driven && !e.inout)
    }

    /// Nets driven by instances but consumed by none: module outputs.
    pub fn external_outputs(&self) -> Vec<NetInfo> {
        self.classified(|e| e.driven && !e.consumed && !e.inout)
    }

    pub fn inouts(&self) -> Vec<NetInfo> {
        self.classified(|e| e.inout)
    }

    /// Nets both driven and consumed inside the module.
    pub fn internal_nets(&self) -> Vec<NetInfo> {
        self.classified(|e| e.driven && e.consumed && !e.inout)
    }

    fn classified(&self, pred: impl Fn(&NetEntry) -> bool) -> Vec<NetInfo> {
        self.nets
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(name, e)| e.info(name))
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }

    pub fn net_info(&self, name: &str) -> Option<NetInfo> {
        self.nets.get(name).map(|e| e.info(name))
    }

    pub fn aggregated_width(&self, name: &str) -> Option<usize> {
        self.nets.get(name).map(|e| e.width())
    }

    /// The width of `name` as seen by everything except the given
    /// connection. This is what the width adapter compares a port against:
    /// a port wider than every other observation must be padded, and its
    /// surplus bits land in an unused-bit helper. `None` when no other
    /// connection touches the net.
    pub fn width_excluding(&self, name: &str, instance: &str, port: &str) -> Option<usize> {
        self.nets.get(name)?.observations
            .iter()
            .filter(|o| !(o.instance == instance && o.port == port))
            .map(|o| o.width)
            .max()
    }

    /// Shrinks one observation after the connection generator padded it, so
    /// the declared net keeps the width the rest of the module uses.
    pub fn clamp_observation(&mut self, name: &str, instance: &str, port: &str, width: usize) {
        if let Some(entry) = self.nets.get_mut(name) {
            for o in &mut entry.observations {
                if o.instance == instance && o.port == port {
                    o.width = o.width.min(width);
                }
            }
        }
    }

    /// Which `(instance, port)` pairs touched `name`.
    pub fn origins(&self, name: &str) -> Vec<(String, String)> {
        self.nets
            .get(name)
            .map(|e| {
                e.observations
                    .iter()
                    .map(|o| (o.instance.clone(), o.port.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registers a helper wire absorbing the upper bits of an instance
    /// output that is wider than its net. Declared alongside internal nets.
    pub fn add_unused_signal(&mut self, name: impl Into<String>, width: usize) {
        self.unused.insert(name.into(), width.max(1));
    }

    pub fn unused_signals(&self) -> impl Iterator<Item = NetInfo> + '_ {
        self.unused.iter().map(|(name, width)| NetInfo {
            name: name.clone(),
            width: *width,
            range_str: None,
        })
    }
}

fn constant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:(?:\d[\d_]*)?'[sS]?[bodhBODH][0-9a-fA-FxXzZ_?]+|\d[\d_]*|'[01xzXZ])\s*$",
        )
        .unwrap()
    })
}

/// Sized and unsized literals: `1'b0`, `8'hFF`, `'0`, `42`, with optional
/// underscores.
pub(crate) fn is_constant_expr(s: &str) -> bool {
    constant_re().is_match(s)
}

/// The unconnected marker: `_` or an empty expression.
pub(crate) fn is_unconnected_expr(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t == "_"
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*").unwrap())
}

/// Extracts the bare identifier names of an expression. Concatenations are
/// split element-wise; constants are dropped; bit selects are stripped.
pub(crate) fn extract_identifiers(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    collect_identifiers(expr, &mut out);
    out
}

fn collect_identifiers(expr: &str, out: &mut Vec<String>) {
    let t = expr.trim();
    if t.is_empty() || is_constant_expr(t) || is_unconnected_expr(t) {
        return;
    }
    if t.starts_with('{') && t.ends_with('}') {
        for element in crate::matcher::split_top_level(&t[1..t.len() - 1], ',') {
            collect_identifiers(element, out);
        }
        return;
    }
    // Replication such as `4{sig}` after the outer braces were stripped.
    if let Some(open) = t.find('{') {
        collect_identifiers(&t[open..], out);
        return;
    }
    // Strip trailing bit selects: `mem[addr][3:0]` -> `mem`.
    let mut core = t;
    while core.ends_with(']') {
        match matching_open_bracket(core) {
            Some(open) => core = core[..open].trim_end(),
            None => break,
        }
    }
    if let Some(m) = ident_re().find(core) {
        out.push(m.as_str().to_string());
    }
}

fn matching_open_bracket(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in s.bytes().enumerate().rev() {
        match b {
            b']' => depth += 1,
            b'[' => {
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
