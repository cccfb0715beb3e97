// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;

use svautos::{
    Analyzer, Config, ConfigOverlay, Error, FrontendConfig, ModuleCatalog, PortGrouping,
    Strictness,
};

/// Expand verilog-mode AUTO comments in SystemVerilog sources.
#[derive(Debug, Parser)]
#[command(name = "svautos", version, about)]
struct Cli {
    /// SystemVerilog source files to expand
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Library directories searched for module definitions
    #[arg(short = 'y', value_name = "DIR")]
    libdir: Vec<String>,

    /// File lists contributing sources and compilation context
    #[arg(short = 'f', value_name = "LIST")]
    filelist: Vec<PathBuf>,

    /// Configuration file (defaults to svautos.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Indentation unit for generated lines
    #[arg(long, value_name = "STR")]
    indent: Option<String>,

    /// AUTOINST port ordering
    #[arg(long, value_name = "MODE", value_parser = ["by_direction", "alphabetical"])]
    group: Option<String>,

    /// Disable column alignment of AUTOINST port names
    #[arg(long)]
    no_align: bool,

    /// Treat unresolved target modules as errors
    #[arg(long)]
    strict: bool,

    /// Emit compiler-resolved numeric ranges instead of preserved range text
    #[arg(long)]
    resolved_ranges: bool,

    /// Skip slang elaboration and use syntax-derived port widths
    #[arg(long)]
    no_elaborate: bool,

    /// Print rewritten buffers to stdout instead of writing files
    #[arg(long)]
    stdout: bool,

    /// Report which files would change without writing anything
    #[arg(long)]
    dry_run: bool,
}

/// `+incdir+`/`+define+`/`+libext+` arguments, which clap would otherwise
/// mistake for positional files.
#[derive(Debug, Default)]
struct PlusArgs {
    incdirs: Vec<String>,
    defines: Vec<String>,
    libexts: Vec<String>,
}

fn apply_plusarg(arg: &str, plus: &mut PlusArgs) {
    let split = |rest: &str| -> Vec<String> {
        rest.split('+')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    if let Some(rest) = arg.strip_prefix("+incdir+") {
        plus.incdirs.extend(split(rest));
    } else if let Some(rest) = arg.strip_prefix("+define+") {
        plus.defines.extend(split(rest));
    } else if let Some(rest) = arg.strip_prefix("+libext+") {
        plus.libexts.extend(split(rest));
    } else {
        log::warn!("ignoring unrecognized plusarg {arg}");
    }
}

/// One `-f` file list: sources and context arguments, one per line, with
/// `#` and `//` comments.
fn read_file_list(
    path: &PathBuf,
    plus: &mut PlusArgs,
    libdirs: &mut Vec<String>,
    sources: &mut Vec<String>,
) -> Result<(), Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::FileList {
        path: path.clone(),
        source,
    })?;
    for line in text.lines() {
        let line = line.split("//").next().unwrap_or("");
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if token.starts_with('+') {
                apply_plusarg(token, plus);
            } else if token == "-y" {
                if let Some(dir) = tokens.get(i + 1) {
                    libdirs.push((*dir).to_string());
                    i += 1;
                }
            } else if let Some(dir) = token.strip_prefix("-y") {
                libdirs.push(dir.to_string());
            } else if token.starts_with('-') {
                log::warn!("ignoring unrecognized file-list argument {token}");
            } else {
                sources.push(token.to_string());
            }
            i += 1;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let mut plus = PlusArgs::default();
    let args: Vec<String> = std::env::args()
        .enumerate()
        .filter(|(i, arg)| {
            if *i > 0 && arg.starts_with('+') {
                apply_plusarg(arg, &mut plus);
                false
            } else {
                true
            }
        })
        .map(|(_, arg)| arg)
        .collect();

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            return Ok(ExitCode::from(code));
        }
    };

    let mut libdirs = cli.libdir.clone();
    let mut extra_sources = Vec::new();
    for list in &cli.filelist {
        read_file_list(list, &mut plus, &mut libdirs, &mut extra_sources)?;
    }

    let file_overlay = match &cli.config {
        Some(path) => Some(ConfigOverlay::from_file(path)?),
        None => {
            let default = PathBuf::from("svautos.toml");
            if default.is_file() {
                Some(ConfigOverlay::from_file(&default)?)
            } else {
                None
            }
        }
    };

    let cli_overlay = ConfigOverlay {
        indent: cli.indent.clone(),
        alignment: cli.no_align.then_some(false),
        grouping: cli.group.as_deref().map(|g| match g {
            "alphabetical" => PortGrouping::Alphabetical,
            _ => PortGrouping::ByDirection,
        }),
        strictness: cli.strict.then_some(Strictness::Strict),
        resolved_ranges: cli.resolved_ranges.then_some(true),
        elaborate: cli.no_elaborate.then_some(false),
        libdirs,
        libext: plus.libexts.clone(),
        incdirs: plus.incdirs.clone(),
        defines: plus.defines.clone(),
    };

    let mut base_layers: Vec<&ConfigOverlay> = Vec::new();
    if let Some(file) = &file_overlay {
        base_layers.push(file);
    }
    base_layers.push(&cli_overlay);
    let base_config = Config::from_layers(&base_layers);

    // Parse every file up front so the catalog sees all module headers
    // before any expansion runs.
    let mut analyzers = Vec::new();
    for path in &cli.files {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?;
        let inline = ConfigOverlay::from_inline_comments(&text);
        let mut layers: Vec<&ConfigOverlay> = Vec::new();
        if let Some(file) = &file_overlay {
            layers.push(file);
        }
        layers.push(&inline);
        layers.push(&cli_overlay);
        let config = Config::from_layers(&layers);
        let analyzer = Analyzer::from_source(path.clone(), text, config)
            .with_context(|| format!("parsing {}", path.display()))?;
        analyzers.push(analyzer);
    }

    let mut catalog = ModuleCatalog::new();
    for analyzer in &analyzers {
        analyzer.register_modules(&mut catalog);
    }

    if base_config.elaborate {
        let mut sources: Vec<String> = cli
            .files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        sources.extend(extra_sources);
        let frontend = FrontendConfig::from_config(&base_config, &sources);
        match catalog.overlay_elaborated(&frontend) {
            Ok(()) => {}
            Err(e) if base_config.strictness == Strictness::Strict => {
                return Err(e).context("elaboration failed in strict mode");
            }
            Err(e) => {
                log::warn!("elaboration unavailable ({e}); using syntax-derived port widths");
            }
        }
    }

    let mut any_errors = false;
    for analyzer in &mut analyzers {
        let expansion = analyzer.analyze(&catalog);
        if analyzer.diagnostics().has_errors() {
            any_errors = true;
        }
        if cli.stdout {
            print!("{}", expansion.text);
        } else if expansion.changed {
            if cli.dry_run {
                println!("{}: would change", analyzer.path().display());
            } else {
                std::fs::write(analyzer.path(), &expansion.text).map_err(|source| {
                    Error::Write {
                        path: analyzer.path().to_path_buf(),
                        source,
                    }
                })?;
            }
        }
    }

    Ok(if any_errors {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}
