// SPDX-License-Identifier: Apache-2.0

//! The per-file expansion pipeline.
//!
//! One [`Analyzer`] owns one source file: its text, its syntax tree, and the
//! diagnostics produced while working on it. [`Analyzer::analyze`] runs the
//! strictly ordered passes — *collect* walks the tree once and finds every
//! marker, instance, and user declaration; *resolve* looks up target-module
//! ports and populates the signal aggregator; *generate* materializes
//! replacement text for every marker; *apply* splices all edits against the
//! original buffer in a single step.

mod autoinst;
mod autologic;
mod autoports;
mod collect;

use std::path::{Path, PathBuf};

use regex::Regex;
use sv_parser::{SyntaxTree, parse_sv_str};

use crate::aggregate::SignalAggregator;
use crate::config::{Config, Strictness};
use crate::diag::{Category, Diagnostics, Error};
use crate::frontend::{ModuleCatalog, PortInfo};
use crate::matcher::{self, ResolvedSignal, SignalValue};
use crate::replace::ReplacementQueue;
use crate::template::{self, AutoTemplate};

use collect::{InstanceSite, ModuleScope};

/// Result of expanding one file. `changed` is false when the output is
/// byte-identical to the input.
#[derive(Clone, Debug)]
pub struct Expansion {
    pub text: String,
    pub changed: bool,
}

/// One connection to be generated under an `/*AUTOINST*/` marker.
pub(crate) struct AutoPort {
    pub port: PortInfo,
    pub resolved: ResolvedSignal,
}

/// Per-file expansion engine. Construct one per source file; files are
/// independent and analyzers share no state.
pub struct Analyzer {
    path: PathBuf,
    text: String,
    tree: SyntaxTree,
    config: Config,
    diags: Diagnostics,
}

impl Analyzer {
    /// Reads and parses a source file.
    pub fn from_file(path: &Path, config: Config) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(path.to_path_buf(), text, config)
    }

    /// Parses source text held in memory. `path` is used for diagnostics
    /// and include resolution.
    pub fn from_source(path: PathBuf, text: String, config: Config) -> Result<Self, Error> {
        let defines = crate::syntax::sv_defines(&config.defines);
        let incdirs: Vec<&Path> = config.incdirs.iter().map(Path::new).collect();
        let (tree, _) = parse_sv_str(&text, &path, &defines, &incdirs, false, false).map_err(
            |e| Error::Parse {
                path: path.clone(),
                message: e.to_string(),
            },
        )?;
        Ok(Analyzer {
            path,
            text,
            tree,
            config,
            diags: Diagnostics::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.text
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diags)
    }

    /// Contributes this file's ANSI module headers to the shared catalog.
    pub fn register_modules(&self, catalog: &mut ModuleCatalog) {
        catalog.add_from_syntax(&self.tree, &self.text, &self.path);
    }

    /// Expands every AUTO region in the file. A file whose target modules
    /// cannot be resolved in strict mode comes back unchanged.
    pub fn analyze(&mut self, catalog: &ModuleCatalog) -> Expansion {
        let index = collect::collect(&self.tree, &self.text, &self.path, &mut self.diags);
        let mut queue = ReplacementQueue::new();
        let mut failed = false;

        for module in &index.modules {
            if !module.has_auto_work() {
                continue;
            }
            log::debug!(
                "module {}: {} instance(s), {} logic marker(s)",
                module.name,
                module.instances.len(),
                module.logic_markers.len()
            );
            self.expand_module(module, &index.templates, catalog, &mut queue, &mut failed);
        }

        if failed {
            log::info!(
                "{}: unresolved modules in strict mode; leaving file unchanged",
                self.path.display()
            );
            return Expansion {
                text: self.text.clone(),
                changed: false,
            };
        }

        let edits = queue.len();
        let new_text = queue.apply(&self.text);
        let changed = new_text != self.text;
        if changed {
            log::info!("{}: applied {} edit(s)", self.path.display(), edits);
        } else {
            log::info!("{}: unchanged", self.path.display());
        }
        Expansion {
            text: new_text,
            changed,
        }
    }

    fn expand_module(
        &mut self,
        module: &ModuleScope,
        templates: &[AutoTemplate],
        catalog: &ModuleCatalog,
        queue: &mut ReplacementQueue,
        failed: &mut bool,
    ) {
        let mut aggregator = SignalAggregator::new();
        let mut resolved: Vec<(&InstanceSite, Vec<AutoPort>)> = Vec::new();

        for site in &module.instances {
            let Some(ports) = catalog.ports(&site.module_type) else {
                let message = format!(
                    "module '{}' for instance '{}' not found in compilation",
                    site.module_type, site.instance_name
                );
                match self.config.strictness {
                    Strictness::Strict => {
                        self.diags
                            .error(Category::UnresolvedModule, &self.path, site.line, message);
                        *failed = true;
                    }
                    Strictness::Lenient => {
                        self.diags
                            .warning(Category::UnresolvedModule, &self.path, site.line, message);
                    }
                }
                continue;
            };
            let auto_ports = self.resolve_instance(site, ports, templates, &mut aggregator);
            resolved.push((site, auto_ports));
        }

        for (site, auto_ports) in &resolved {
            autoinst::generate(
                site,
                auto_ports,
                &mut aggregator,
                &self.config,
                &self.text,
                &self.path,
                queue,
                &mut self.diags,
            );
        }
        for marker in &module.logic_markers {
            autologic::generate(module, marker, &aggregator, &self.config, &self.text, queue);
        }
        autoports::generate(module, &aggregator, &self.config, &self.text, queue);
    }

    /// Feeds every connection of one instance into the aggregator and
    /// resolves the ports an `/*AUTOINST*/` marker will generate.
    fn resolve_instance(
        &mut self,
        site: &InstanceSite,
        ports: &[PortInfo],
        templates: &[AutoTemplate],
        aggregator: &mut SignalAggregator,
    ) -> Vec<AutoPort> {
        // Connections after the marker belong to a previous expansion; they
        // are regenerated from scratch and do not count as manual.
        let manual_limit = site.marker.as_ref().map(|m| m.start).unwrap_or(usize::MAX);
        let mut manual_names: Vec<&str> = Vec::new();
        for conn in &site.connections {
            if conn.offset >= manual_limit {
                continue;
            }
            manual_names.push(conn.port.as_str());
            let Some(expr) = &conn.expr else {
                continue;
            };
            match ports.iter().find(|p| p.name == conn.port) {
                Some(port) => aggregator.record(&site.instance_name, port, expr),
                None => log::debug!(
                    "connection to unknown port {}.{} ignored",
                    site.module_type,
                    conn.port
                ),
            }
        }
        for (expr, port) in site.ordered_exprs.iter().zip(ports) {
            aggregator.record(&site.instance_name, port, expr);
        }

        let Some(marker) = site.marker.as_ref() else {
            return Vec::new();
        };
        if !site.ordered_exprs.is_empty() {
            log::debug!(
                "instance {} mixes positional connections with AUTOINST; skipped",
                site.instance_name
            );
            return Vec::new();
        }

        let filter = marker.filter.as_ref().and_then(|f| match Regex::new(f) {
            Ok(re) => Some(re),
            Err(e) => {
                self.diags.warning(
                    Category::TemplateSyntax,
                    &self.path,
                    site.line,
                    format!("invalid AUTOINST filter '{f}': {e}"),
                );
                None
            }
        });
        let template = template::select_template(templates, &site.module_type, site.line);

        let mut auto_ports = Vec::new();
        for port in ports {
            if manual_names.contains(&port.name.as_str()) {
                continue;
            }
            if let Some(re) = &filter
                && !re.is_match(&port.name)
            {
                continue;
            }
            let resolved = matcher::resolve_signal(
                template,
                &site.instance_name,
                port,
                &self.path,
                site.line,
                &mut self.diags,
            );
            if let SignalValue::Expr(signal) = &resolved.value {
                aggregator.record(&site.instance_name, port, signal);
            }
            auto_ports.push(AutoPort {
                port: port.clone(),
                resolved,
            });
        }
        auto_ports
    }
}
