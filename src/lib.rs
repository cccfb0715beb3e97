// SPDX-License-Identifier: Apache-2.0

//! Expand verilog-mode AUTO comments in SystemVerilog sources.
//!
//! The engine finds `/*AUTOINST*/`, `/*AUTOLOGIC*/`, and `/*AUTOPORTS*/`
//! markers (plus `AUTO_TEMPLATE` rename directives) inside comments and
//! rewrites the surrounding source byte-accurately: generated port
//! connections, internal net declarations, and ANSI port list entries.
//! Running the tool on its own output is a no-op.

mod aggregate;
pub use aggregate::{NetInfo, SignalAggregator};

mod analyzer;
pub use analyzer::{Analyzer, Expansion};

mod config;
pub use config::{Config, ConfigOverlay, PortGrouping, Strictness};

mod diag;
pub use diag::{Category, Diagnostic, Diagnostics, Error, Severity};

mod frontend;
pub use frontend::{FrontendConfig, ModuleCatalog, PortDir, PortInfo};

mod matcher;

mod replace;
pub use replace::{Replacement, ReplacementQueue};

mod syntax;

mod template;
pub use template::{
    AutoTemplate, DeclKeyword, FENCE_BEGIN, FENCE_END, MARKER_AUTOINST, MARKER_AUTOLOGIC,
    MARKER_AUTOPORTS, MARKER_AUTOREG, MARKER_AUTOWIRE, TemplateRule, select_template,
};

mod util;
