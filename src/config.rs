// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use serde::Deserialize;

use crate::diag::Error;

/// Ordering of generated `AUTOINST` connections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortGrouping {
    /// Outputs, then inouts, then inputs, each group headed by a comment.
    #[default]
    ByDirection,
    /// Lexicographic by port name, no group comments.
    Alphabetical,
}

/// How to treat instances whose target module cannot be resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Strict,
    #[default]
    Lenient,
}

/// Fully resolved configuration for one run. Built by layering overlays on
/// top of the defaults; precedence is CLI > inline comments > config file.
#[derive(Clone, Debug)]
pub struct Config {
    /// Single indentation unit used for generated lines.
    pub indent: String,
    /// Column-align port names in `AUTOINST` expansions.
    pub alignment: bool,
    pub grouping: PortGrouping,
    pub strictness: Strictness,
    /// Prefer compiler-resolved numeric ranges over preserved range text.
    pub resolved_ranges: bool,
    /// Run the slang frontend to resolve parameterized port widths.
    pub elaborate: bool,
    pub libdirs: Vec<String>,
    pub libext: Vec<String>,
    pub incdirs: Vec<String>,
    pub defines: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            indent: "  ".to_string(),
            alignment: true,
            grouping: PortGrouping::ByDirection,
            strictness: Strictness::Lenient,
            resolved_ranges: false,
            elaborate: true,
            libdirs: Vec::new(),
            libext: Vec::new(),
            incdirs: Vec::new(),
            defines: Vec::new(),
        }
    }
}

/// A partial configuration from one source (TOML file, inline comments, or
/// the command line). Scalar options replace; list options are additive.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    pub indent: Option<String>,
    pub alignment: Option<bool>,
    pub grouping: Option<PortGrouping>,
    pub strictness: Option<Strictness>,
    pub resolved_ranges: Option<bool>,
    pub elaborate: Option<bool>,
    #[serde(default)]
    pub libdirs: Vec<String>,
    #[serde(default)]
    pub libext: Vec<String>,
    #[serde(default)]
    pub incdirs: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
}

impl ConfigOverlay {
    /// Loads an overlay from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Collects `// autos: key = value` lines from a source buffer. Unknown
    /// keys and unparseable values are skipped with a debug log entry.
    pub fn from_inline_comments(text: &str) -> Self {
        let mut overlay = ConfigOverlay::default();
        for line in text.lines() {
            let Some(rest) = line.trim_start().strip_prefix("// autos:") else {
                continue;
            };
            let Some((key, value)) = rest.split_once('=') else {
                log::debug!("ignoring inline option without '=': {}", rest.trim());
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            match key {
                "indent" => overlay.indent = Some(value.to_string()),
                "alignment" => overlay.alignment = parse_bool(key, value),
                "resolved_ranges" => overlay.resolved_ranges = parse_bool(key, value),
                "elaborate" => overlay.elaborate = parse_bool(key, value),
                "grouping" => match value {
                    "by_direction" => overlay.grouping = Some(PortGrouping::ByDirection),
                    "alphabetical" => overlay.grouping = Some(PortGrouping::Alphabetical),
                    other => log::debug!("ignoring unknown grouping {other:?}"),
                },
                "strictness" => match value {
                    "strict" => overlay.strictness = Some(Strictness::Strict),
                    "lenient" => overlay.strictness = Some(Strictness::Lenient),
                    other => log::debug!("ignoring unknown strictness {other:?}"),
                },
                other => log::debug!("ignoring unknown inline option {other:?}"),
            }
        }
        overlay
    }
}

fn parse_bool(key: &str, value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        other => {
            log::debug!("ignoring non-boolean value {other:?} for {key}");
            None
        }
    }
}

impl Config {
    /// Applies one overlay in place.
    pub fn apply(&mut self, overlay: &ConfigOverlay) {
        if let Some(indent) = &overlay.indent {
            self.indent = indent.clone();
        }
        if let Some(alignment) = overlay.alignment {
            self.alignment = alignment;
        }
        if let Some(grouping) = overlay.grouping {
            self.grouping = grouping;
        }
        if let Some(strictness) = overlay.strictness {
            self.strictness = strictness;
        }
        if let Some(resolved_ranges) = overlay.resolved_ranges {
            self.resolved_ranges = resolved_ranges;
        }
        if let Some(elaborate) = overlay.elaborate {
            self.elaborate = elaborate;
        }
        self.libdirs.extend(overlay.libdirs.iter().cloned());
        self.libext.extend(overlay.libext.iter().cloned());
        self.incdirs.extend(overlay.incdirs.iter().cloned());
        self.defines.extend(overlay.defines.iter().cloned());
    }

    /// Builds a configuration from layered overlays, lowest priority first.
    pub fn from_layers(layers: &[&ConfigOverlay]) -> Config {
        let mut config = Config::default();
        for layer in layers {
            config.apply(layer);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.indent, "  ");
        assert!(config.alignment);
        assert_eq!(config.grouping, PortGrouping::ByDirection);
        assert_eq!(config.strictness, Strictness::Lenient);
    }

    #[test]
    fn toml_overlay() {
        let overlay: ConfigOverlay = toml::from_str(
            r#"
            indent = "    "
            grouping = "alphabetical"
            strictness = "strict"
            libdirs = ["rtl/lib"]
            "#,
        )
        .unwrap();
        let config = Config::from_layers(&[&overlay]);
        assert_eq!(config.indent, "    ");
        assert_eq!(config.grouping, PortGrouping::Alphabetical);
        assert_eq!(config.strictness, Strictness::Strict);
        assert_eq!(config.libdirs, vec!["rtl/lib".to_string()]);
    }

    #[test]
    fn inline_comments() {
        let src = "\
// autos: alignment = false
// autos: grouping = alphabetical
module m; endmodule
";
        let overlay = ConfigOverlay::from_inline_comments(src);
        assert_eq!(overlay.alignment, Some(false));
        assert_eq!(overlay.grouping, Some(PortGrouping::Alphabetical));
        assert_eq!(overlay.indent, None);
    }

    #[test]
    fn layer_priority() {
        let file = ConfigOverlay {
            indent: Some("    ".to_string()),
            alignment: Some(false),
            ..Default::default()
        };
        let cli = ConfigOverlay {
            alignment: Some(true),
            ..Default::default()
        };
        let config = Config::from_layers(&[&file, &cli]);
        assert_eq!(config.indent, "    ");
        assert!(config.alignment);
    }

    #[test]
    fn lists_accumulate() {
        let a = ConfigOverlay {
            incdirs: vec!["inc1".to_string()],
            ..Default::default()
        };
        let b = ConfigOverlay {
            incdirs: vec!["inc2".to_string()],
            ..Default::default()
        };
        let config = Config::from_layers(&[&a, &b]);
        assert_eq!(config.incdirs, vec!["inc1".to_string(), "inc2".to_string()]);
    }
}
