// SPDX-License-Identifier: Apache-2.0

//! `/*AUTOINST*/` expansion: the width-adaptive connection generator.

use std::path::Path;

use crate::aggregate::SignalAggregator;
use crate::config::{Config, PortGrouping};
use crate::diag::{Category, Diagnostics};
use crate::frontend::PortDir;
use crate::matcher::{self, SignalValue};
use crate::replace::{Replacement, ReplacementQueue};
use crate::util;

use super::AutoPort;
use super::collect::InstanceSite;

pub(super) fn generate(
    site: &InstanceSite,
    auto_ports: &[AutoPort],
    aggregator: &mut SignalAggregator,
    config: &Config,
    text: &str,
    path: &Path,
    queue: &mut ReplacementQueue,
    diags: &mut Diagnostics,
) {
    let Some(marker) = site.marker.as_ref() else {
        return;
    };

    let entries: Vec<(PortDir, String, String)> = auto_ports
        .iter()
        .map(|ap| {
            let signal = adapt_width(ap, site, aggregator, path, diags);
            (ap.port.dir, ap.port.name.clone(), signal)
        })
        .collect();

    let inner_indent = format!("{}{}", site.indent, config.indent);
    let mut out = String::new();

    if !entries.is_empty() {
        if let Some(c) = util::last_nonblank_before(text, marker.start)
            && c != ','
            && c != '('
        {
            out.push(',');
        }

        let groups: Vec<(Option<&str>, Vec<&(PortDir, String, String)>)> = match config.grouping {
            PortGrouping::ByDirection => {
                let pick = |dir: PortDir| -> Vec<&(PortDir, String, String)> {
                    entries.iter().filter(|e| e.0 == dir).collect()
                };
                vec![
                    (Some("// Outputs"), pick(PortDir::Output)),
                    (Some("// Inouts"), pick(PortDir::Inout)),
                    (Some("// Inputs"), pick(PortDir::Input)),
                ]
            }
            PortGrouping::Alphabetical => {
                let mut sorted: Vec<&(PortDir, String, String)> = entries.iter().collect();
                sorted.sort_by(|a, b| a.1.cmp(&b.1));
                vec![(None, sorted)]
            }
        };

        let total: usize = groups.iter().map(|(_, items)| items.len()).sum();
        let name_width = entries.iter().map(|e| e.1.len()).max().unwrap_or(0);
        let mut emitted = 0;
        for (comment, items) in groups {
            if items.is_empty() {
                continue;
            }
            if let Some(comment) = comment {
                out.push('\n');
                out.push_str(&inner_indent);
                out.push_str(comment);
            }
            for (_, name, signal) in items {
                emitted += 1;
                out.push('\n');
                out.push_str(&inner_indent);
                if config.alignment {
                    out.push_str(&format!(".{name:<name_width$} ({signal})"));
                } else {
                    out.push_str(&format!(".{name} ({signal})"));
                }
                if emitted < total {
                    out.push(',');
                }
            }
        }
        out.push('\n');
        out.push_str(&site.indent);
    }

    let region = (marker.end, site.close_paren);
    if out.is_empty() && text[region.0..region.1].trim().is_empty() {
        return;
    }
    if &text[region.0..region.1] == out {
        log::debug!(
            "AUTOINST {} already expanded; nothing to do",
            site.instance_name
        );
        return;
    }
    queue.push(Replacement {
        start: region.0,
        end: region.1,
        text: out,
        label: format!("AUTOINST {}", site.instance_name),
    });
}

/// Applies the width adaptation table: slices over-wide nets, zero-pads
/// narrow inputs, and absorbs surplus output bits into a helper wire. Only
/// untemplated connections are adapted; an expression chosen by a template
/// rule is emitted verbatim.
fn adapt_width(
    ap: &AutoPort,
    site: &InstanceSite,
    aggregator: &mut SignalAggregator,
    path: &Path,
    diags: &mut Diagnostics,
) -> String {
    match &ap.resolved.value {
        SignalValue::Unconnected => String::new(),
        SignalValue::Constant(kind) => matcher::format_constant(*kind, ap.port.width),
        SignalValue::Expr(signal) => {
            if ap.resolved.matched_rule.is_some() {
                return signal.clone();
            }
            // Compare against the width the rest of the module uses; a net
            // nothing else touches needs no adaptation.
            let Some(net_width) =
                aggregator.width_excluding(signal, &site.instance_name, &ap.port.name)
            else {
                return signal.clone();
            };
            let port_width = ap.port.width;
            if port_width == net_width {
                signal.clone()
            } else if port_width < net_width {
                if port_width == 1 {
                    format!("{signal}[0]")
                } else {
                    format!("{signal}[{}:0]", port_width - 1)
                }
            } else {
                match ap.port.dir {
                    PortDir::Input => {
                        aggregator.clamp_observation(
                            signal,
                            &site.instance_name,
                            &ap.port.name,
                            net_width,
                        );
                        format!("{{'0, {signal}}}")
                    }
                    PortDir::Output => {
                        let helper = format!("unused_{signal}_{}", site.instance_name);
                        aggregator.add_unused_signal(&helper, port_width - net_width);
                        aggregator.clamp_observation(
                            signal,
                            &site.instance_name,
                            &ap.port.name,
                            net_width,
                        );
                        format!("{{{helper}, {signal}}}")
                    }
                    PortDir::Inout => {
                        diags.warning(
                            Category::WidthConflict,
                            path,
                            site.line,
                            format!(
                                "inout port '{}' of instance '{}' is {} bits but net \
                                 '{signal}' is {}; emitting unchanged",
                                ap.port.name, site.instance_name, port_width, net_width
                            ),
                        );
                        signal.clone()
                    }
                }
            }
        }
    }
}
