use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::document::template::{DocumentTemplate, DOCUMENT_TEMPLATE_NAME};
use crate::pipeline::orchestrator::{BuildMode, BuildOptions};
use crate::stylesheet::template::TemplateSet;
use crate::validate::probe::{RenderProbe, StaticLayoutProbe};
use crate::validate::validator::DEFAULT_TOLERANCE_CM;

/// Which render probe backs the layout check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Static,
    Off,
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(ProbeKind::Static),
            "off" | "none" => Ok(ProbeKind::Off),
            other => Err(format!("unknown render probe '{other}' (expected static or off)")),
        }
    }
}

/// Build configuration loaded from environment variables (and `.env`).
/// Command-line flags override individual fields afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub tokens_path: PathBuf,
    pub out_dir: PathBuf,
    /// Directory holding `base.css`, `preview.css`, `print.css` and optionally
    /// `document.toml`. Built-in templates are used when unset.
    pub template_dir: Option<PathBuf>,
    pub mode: BuildMode,
    pub tolerance_cm: f64,
    pub render_probe: ProbeKind,
    pub probe_timeout: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Config {
            tokens_path: get("STYLEC_TOKENS")
                .unwrap_or_else(|| "styles/tokens.toml".to_string())
                .into(),
            out_dir: get("STYLEC_OUT_DIR")
                .unwrap_or_else(|| "dist/styles".to_string())
                .into(),
            template_dir: get("STYLEC_TEMPLATE_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            mode: parse_or(&get, "STYLEC_MODE", BuildMode::Strict)?,
            tolerance_cm: parse_or(&get, "STYLEC_TOLERANCE_CM", DEFAULT_TOLERANCE_CM)?,
            render_probe: parse_or(&get, "STYLEC_RENDER_PROBE", ProbeKind::Static)?,
            probe_timeout: Duration::from_millis(parse_or(&get, "STYLEC_PROBE_TIMEOUT_MS", 2000u64)?),
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };
        config.check()?;
        Ok(config)
    }

    /// Re-checks values that flags may have overridden.
    pub fn check(&self) -> Result<()> {
        if !(self.tolerance_cm.is_finite() && self.tolerance_cm >= 0.0) {
            return Err(anyhow!(
                "tolerance must be a non-negative number of centimetres, got {}",
                self.tolerance_cm
            ));
        }
        Ok(())
    }

    pub fn build_options(&self) -> Result<BuildOptions> {
        let (templates, document_template) = match &self.template_dir {
            Some(dir) => {
                let templates = TemplateSet::from_dir(dir)
                    .with_context(|| format!("loading stylesheet templates from {}", dir.display()))?;
                let document_path = dir.join(DOCUMENT_TEMPLATE_NAME);
                let document = if document_path.exists() {
                    DocumentTemplate::from_path(&document_path)
                        .with_context(|| format!("loading {}", document_path.display()))?
                } else {
                    DocumentTemplate::builtin()?
                };
                (templates, document)
            }
            None => (TemplateSet::builtin()?, DocumentTemplate::builtin()?),
        };

        let probe: Option<Arc<dyn RenderProbe>> = match self.render_probe {
            ProbeKind::Static => Some(Arc::new(StaticLayoutProbe::default())),
            ProbeKind::Off => None,
        };

        Ok(BuildOptions {
            mode: self.mode,
            tolerance_cm: self.tolerance_cm,
            templates,
            document_template,
            probe,
            probe_timeout: self.probe_timeout,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.tokens_path, PathBuf::from("styles/tokens.toml"));
        assert_eq!(c.out_dir, PathBuf::from("dist/styles"));
        assert_eq!(c.template_dir, None);
        assert_eq!(c.mode, BuildMode::Strict);
        assert_eq!(c.tolerance_cm, DEFAULT_TOLERANCE_CM);
        assert_eq!(c.render_probe, ProbeKind::Static);
        assert_eq!(c.probe_timeout, Duration::from_millis(2000));
        assert_eq!(c.rust_log, "info");
    }

    #[test]
    fn test_overrides_from_environment() {
        let c = config(&[
            ("STYLEC_MODE", "lenient"),
            ("STYLEC_TOLERANCE_CM", "0.05"),
            ("STYLEC_RENDER_PROBE", "off"),
            ("STYLEC_PROBE_TIMEOUT_MS", "250"),
            ("STYLEC_TEMPLATE_DIR", "custom/templates"),
        ])
        .unwrap();
        assert_eq!(c.mode, BuildMode::Lenient);
        assert_eq!(c.tolerance_cm, 0.05);
        assert_eq!(c.render_probe, ProbeKind::Off);
        assert_eq!(c.probe_timeout, Duration::from_millis(250));
        assert_eq!(c.template_dir, Some(PathBuf::from("custom/templates")));
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = config(&[("STYLEC_MODE", "loose")]).unwrap_err();
        assert!(format!("{err:#}").contains("STYLEC_MODE"), "{err:#}");
        let err = config(&[("STYLEC_TOLERANCE_CM", "-1")]).unwrap_err();
        assert!(err.to_string().contains("non-negative"), "{err}");
    }

    #[test]
    fn test_build_options_follow_probe_setting() {
        let on = config(&[]).unwrap().build_options().unwrap();
        assert!(on.probe.is_some());
        let off = config(&[("STYLEC_RENDER_PROBE", "off")])
            .unwrap()
            .build_options()
            .unwrap();
        assert!(off.probe.is_none());
    }

    #[test]
    fn test_template_dir_without_document_toml_uses_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.css"), "body { margin: 0; }").unwrap();
        std::fs::write(dir.path().join("preview.css"), "").unwrap();
        std::fs::write(dir.path().join("print.css"), "").unwrap();
        let mut c = config(&[]).unwrap();
        c.template_dir = Some(dir.path().to_path_buf());
        let options = c.build_options().unwrap();
        assert_eq!(options.document_template, DocumentTemplate::builtin().unwrap());
        assert_eq!(options.templates.print.layers[0].rules[0].selector, "body");
    }
}
