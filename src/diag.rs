// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};

/// Severity of a collected diagnostic. Warnings never prevent output from
/// being emitted; errors make the driver exit nonzero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Category tag carried by every diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Malformed `AUTO_TEMPLATE` lines or invalid regular expressions.
    TemplateSyntax,
    /// An instantiated module has no resolvable definition.
    UnresolvedModule,
    /// A bidirectional port is wider than the aggregated net.
    WidthConflict,
    /// A template assigned a constant to an output port.
    ConstantOutput,
    /// Unreadable input files, file lists, or frontend failures.
    Io,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::TemplateSyntax => "template-syntax",
            Category::UnresolvedModule => "unresolved-module",
            Category::WidthConflict => "width-conflict",
            Category::ConstantOutput => "constant-output",
            Category::Io => "io",
        };
        write!(f, "{name}")
    }
}

/// One collected diagnostic, tied to a file and 1-based source line.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub file: PathBuf,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {} [{}]",
            self.file.display(),
            self.line,
            self.severity,
            self.message,
            self.category
        )
    }
}

/// Accumulates diagnostics for one run. Warnings are mirrored to the `log`
/// facade as they arrive so that `RUST_LOG` surfaces them even when the
/// caller discards the collector.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(
        &mut self,
        category: Category,
        file: &Path,
        line: usize,
        message: impl Into<String>,
    ) {
        self.emit(Severity::Warning, category, file, line, message.into());
    }

    pub fn error(
        &mut self,
        category: Category,
        file: &Path,
        line: usize,
        message: impl Into<String>,
    ) {
        self.emit(Severity::Error, category, file, line, message.into());
    }

    fn emit(
        &mut self,
        severity: Severity,
        category: Category,
        file: &Path,
        line: usize,
        message: String,
    ) {
        let diag = Diagnostic {
            severity,
            category,
            file: file.to_path_buf(),
            line,
            message,
        };
        match severity {
            Severity::Warning => log::warn!("{diag}"),
            Severity::Error => log::error!("{diag}"),
        }
        self.entries.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity.is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Moves all diagnostics out of `other` into this collector.
    pub fn absorb(&mut self, mut other: Diagnostics) {
        self.entries.append(&mut other.entries);
    }
}

/// Unrecoverable failures. Everything else inside the engine degrades to a
/// [`Diagnostic`] and leaves the source untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file list {path}: {source}")]
    FileList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to load config {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("slang frontend failed: {0}")]
    Frontend(String),
}
