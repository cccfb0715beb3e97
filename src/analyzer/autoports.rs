// SPDX-License-Identifier: Apache-2.0

//! `/*AUTOPORTS*/` expansion: rewrites the tail of an ANSI port list with
//! the externally visible nets of the module.

use std::collections::HashSet;

use crate::aggregate::SignalAggregator;
use crate::config::Config;
use crate::frontend::PortDir;
use crate::replace::{Replacement, ReplacementQueue};
use crate::util;

use super::autologic::range_text;
use super::collect::ModuleScope;

pub(super) fn generate(
    module: &ModuleScope,
    aggregator: &SignalAggregator,
    config: &Config,
    text: &str,
    queue: &mut ReplacementQueue,
) {
    let Some(marker) = module.ports_marker.as_ref() else {
        return;
    };
    let Some(close) = module.header_close else {
        return;
    };

    // Ports the user wrote before the marker are theirs; ports after it are
    // owned by a previous expansion and get replaced.
    let existing: HashSet<&str> = module
        .header_ports
        .iter()
        .filter(|(_, offset)| *offset < marker.start)
        .map(|(name, _)| name.as_str())
        .collect();

    let mut nets: Vec<(PortDir, crate::aggregate::NetInfo)> = Vec::new();
    nets.extend(aggregator.external_outputs().into_iter().map(|n| (PortDir::Output, n)));
    nets.extend(aggregator.inouts().into_iter().map(|n| (PortDir::Inout, n)));
    nets.extend(aggregator.external_inputs().into_iter().map(|n| (PortDir::Input, n)));
    nets.retain(|(_, net)| {
        !existing.contains(net.name.as_str()) && !module.user_decls.contains(net.name.as_str())
    });

    let lead = format!("\n{}{}", config.indent, config.indent);
    let mut out = String::new();
    if !nets.is_empty() {
        if let Some(c) = util::last_nonblank_before(text, marker.start)
            && c != ','
            && c != '('
        {
            out.push(',');
        }
        for (i, (dir, net)) in nets.iter().enumerate() {
            out.push_str(&lead);
            out.push_str(&port_entry(*dir, net, config));
            if i + 1 < nets.len() {
                out.push(',');
            }
        }
        out.push('\n');
        out.push_str(&module.header_indent);
    }

    let region = (marker.end, close);
    if out.is_empty() && text[region.0..region.1].trim().is_empty() {
        return;
    }
    if &text[region.0..region.1] == out {
        log::debug!("AUTOPORTS in {} already expanded; nothing to do", module.name);
        return;
    }
    queue.push(Replacement {
        start: region.0,
        end: region.1,
        text: out,
        label: format!("AUTOPORTS {}", module.name),
    });
}

fn port_entry(dir: PortDir, net: &crate::aggregate::NetInfo, config: &Config) -> String {
    let range = range_text(net, config);
    if range.is_empty() {
        format!("{} logic {}", dir.keyword(), net.name)
    } else {
        format!("{} logic {} {}", dir.keyword(), range, net.name)
    }
}
