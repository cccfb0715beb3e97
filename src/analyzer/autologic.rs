// SPDX-License-Identifier: Apache-2.0

//! `/*AUTOLOGIC*/` expansion: declaration blocks for internal nets.

use indexmap::IndexMap;

use crate::aggregate::{NetInfo, SignalAggregator};
use crate::config::Config;
use crate::replace::{Replacement, ReplacementQueue};
use crate::template::{DeclKeyword, FENCE_BEGIN, FENCE_END};

use super::collect::{LogicMarker, ModuleScope};

pub(super) fn generate(
    module: &ModuleScope,
    marker: &LogicMarker,
    aggregator: &SignalAggregator,
    config: &Config,
    text: &str,
    queue: &mut ReplacementQueue,
) {
    // Internal nets first, then the unused-bit helpers registered by the
    // connection generator. Anything the user already declared, including
    // header ports, stays out.
    let mut declared: IndexMap<String, NetInfo> = IndexMap::new();
    for net in aggregator.internal_nets() {
        declared.insert(net.name.clone(), net);
    }
    for net in aggregator.unused_signals() {
        declared.insert(net.name.clone(), net);
    }
    declared.retain(|name, _| {
        !module.user_decls.contains(name)
            && !module.header_ports.iter().any(|(p, _)| p == name)
    });

    let lines: Vec<String> = declared
        .values()
        .map(|net| declaration_line(marker.keyword, net, config))
        .collect();

    let indent = &marker.indent;
    let mut block = String::new();
    if !lines.is_empty() {
        block.push_str(indent);
        block.push_str(FENCE_BEGIN);
        for line in &lines {
            block.push('\n');
            block.push_str(indent);
            block.push_str(line);
        }
        block.push('\n');
        block.push_str(indent);
        block.push_str(FENCE_END);
    }

    let (region, new_text) = match marker.fence {
        Some((start, end)) => ((start, end), block),
        None => {
            if block.is_empty() {
                return;
            }
            ((marker.end, marker.end), format!("\n{block}"))
        }
    };

    if &text[region.0..region.1] == new_text {
        log::debug!("AUTOLOGIC in {} already expanded; nothing to do", module.name);
        return;
    }
    queue.push(Replacement {
        start: region.0,
        end: region.1,
        text: new_text,
        label: format!("AUTOLOGIC {}", module.name),
    });
}

fn declaration_line(keyword: DeclKeyword, net: &NetInfo, config: &Config) -> String {
    let range = range_text(net, config);
    if range.is_empty() {
        format!("{} {};", keyword.as_str(), net.name)
    } else {
        format!("{} {} {};", keyword.as_str(), range, net.name)
    }
}

/// Preserved range text wins unless the configuration asks for resolved
/// ranges; scalars carry no range at all.
pub(super) fn range_text(net: &NetInfo, config: &Config) -> String {
    if !config.resolved_ranges
        && let Some(range) = &net.range_str
    {
        return range.clone();
    }
    if net.width > 1 {
        format!("[{}:0]", net.width - 1)
    } else {
        String::new()
    }
}
