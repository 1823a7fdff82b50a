mod config;
mod document;
mod errors;
mod pipeline;
mod stylesheet;
mod tokens;
mod units;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, ProbeKind};
use crate::errors::StyleError;
use crate::pipeline::{
    build_all, remove_stale_stylesheets, write_artifacts, write_report, BuildError, BuildMode,
};

/// Compiles one set of design tokens into preview CSS, print CSS and document styles,
/// and proves the three agree.
#[derive(Debug, Parser)]
#[command(name = "stylec", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build every target and write preview.css, print.css and report.json.
    Build(BuildArgs),
}

/// Flags override the corresponding STYLEC_* environment variables.
#[derive(Debug, Args)]
struct BuildArgs {
    /// Token source (TOML).
    #[arg(long)]
    tokens: Option<PathBuf>,
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Directory with base.css, preview.css, print.css and document.toml.
    #[arg(long)]
    template_dir: Option<PathBuf>,
    /// strict | lenient
    #[arg(long)]
    mode: Option<BuildMode>,
    /// Largest accepted cross-target difference, in cm.
    #[arg(long)]
    tolerance: Option<f64>,
    /// static | off
    #[arg(long)]
    render_probe: Option<ProbeKind>,
}

impl BuildArgs {
    fn apply(self, mut config: Config) -> Result<Config> {
        if let Some(tokens) = self.tokens {
            config.tokens_path = tokens;
        }
        if let Some(out_dir) = self.out_dir {
            config.out_dir = out_dir;
        }
        if let Some(dir) = self.template_dir {
            config.template_dir = Some(dir);
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance_cm = tolerance;
        }
        if let Some(probe) = self.render_probe {
            config.render_probe = probe;
        }
        config.check()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return usage_exit(&e),
    };

    // Load configuration first; flags are layered on top below.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("stylec: {e:#}");
            return ExitCode::from(1);
        }
    };

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("stylec v{}", env!("CARGO_PKG_VERSION"));

    let outcome = match cli.command {
        Command::Build(args) => match args.apply(config) {
            Ok(config) => run_build(&config).await,
            Err(e) => Err(e),
        },
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Help and version exit 0; every other usage error is bad input (1).
fn usage_exit(e: &clap::Error) -> ExitCode {
    let _ = e.print();
    ExitCode::from(usage_exit_code(e))
}

fn usage_exit_code(e: &clap::Error) -> u8 {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

async fn run_build(config: &Config) -> Result<()> {
    let source = std::fs::read_to_string(&config.tokens_path)
        .map_err(StyleError::from)
        .with_context(|| format!("reading token source {}", config.tokens_path.display()))?;
    let snapshot = Arc::new(tokens::load(&source)?);
    info!(
        tokens = snapshot.len(),
        version = %snapshot.version(),
        path = %config.tokens_path.display(),
        "Token snapshot loaded"
    );

    let options = config.build_options()?;
    match build_all(snapshot, &options).await {
        Ok(output) => {
            write_artifacts(&output, &config.out_dir)?;
            info!(
                out_dir = %config.out_dir.display(),
                summary = %output.report.summary_line(),
                "Build succeeded"
            );
            Ok(())
        }
        Err(err) => {
            // A strict divergence still leaves the report behind for inspection.
            if let Some(report) = err.report() {
                let written = write_report(report, &config.out_dir)?;
                info!(path = %written.path.display(), "Divergence report written");
                for removed in remove_stale_stylesheets(&config.out_dir)? {
                    warn!(
                        path = %removed.display(),
                        snapshot = %report.snapshot_version,
                        "Removed stylesheet from an earlier build"
                    );
                }
            }
            Err(err.into())
        }
    }
}

/// 0 success, 1 parse/conversion/template/IO, 2 protected rule, 3 strict divergence.
fn exit_code(e: &anyhow::Error) -> u8 {
    if let Some(build) = e.downcast_ref::<BuildError>() {
        return build.exit_code();
    }
    if let Some(style) = e.downcast_ref::<StyleError>() {
        return style.exit_code();
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::artifact::Target;
    use crate::pipeline::orchestrator::Stage;

    #[test]
    fn test_exit_code_downcasts_through_anyhow() {
        let build: anyhow::Error = BuildError {
            stage: Stage::CompilePrint,
            source: StyleError::ProtectedRuleViolation {
                target: Target::Print,
                selector: ".bullets li".into(),
                property: "padding-left".into(),
                token_id: "spacing.bullet-indent".into(),
                location: errors::TemplateLocation::at_line("base.css", 40),
                reason: "was removed from the output".into(),
            },
        }
        .into();
        assert_eq!(exit_code(&build), 2);

        let parse: anyhow::Error = StyleError::token_parse(None, "bad").into();
        assert_eq!(exit_code(&parse.context("loading tokens")), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("anything else")), 1);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::try_parse_from([
            "stylec",
            "build",
            "--mode",
            "lenient",
            "--tolerance",
            "0.02",
            "--render-probe",
            "off",
            "--out-dir",
            "out",
        ])
        .unwrap();
        let Command::Build(args) = cli.command;
        let base = Config::from_env().unwrap();
        let config = args.apply(base).unwrap();
        assert_eq!(config.mode, BuildMode::Lenient);
        assert_eq!(config.tolerance_cm, 0.02);
        assert_eq!(config.render_probe, ProbeKind::Off);
        assert_eq!(config.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_cli_usage_errors_exit_1() {
        for args in [
            vec!["stylec", "build", "--mode", "loose"],
            vec!["stylec", "build", "--tolerance", "abc"],
            vec!["stylec", "build", "--render-probe", "browser"],
            vec!["stylec"],
        ] {
            let err = Cli::try_parse_from(args.iter().copied()).unwrap_err();
            assert_eq!(usage_exit_code(&err), 1, "{args:?}");
        }
    }

    #[test]
    fn test_cli_help_and_version_exit_0() {
        let help = Cli::try_parse_from(["stylec", "--help"]).unwrap_err();
        assert_eq!(usage_exit_code(&help), 0);
        let version = Cli::try_parse_from(["stylec", "--version"]).unwrap_err();
        assert_eq!(usage_exit_code(&version), 0);
    }

    #[test]
    fn test_negative_tolerance_flag_is_exit_1() {
        let cli = Cli::try_parse_from(["stylec", "build", "--tolerance=-1"]).unwrap();
        let Command::Build(args) = cli.command;
        let err = args.apply(Config::from_env().unwrap()).unwrap_err();
        assert_eq!(exit_code(&err), 1);
    }

    #[tokio::test]
    async fn test_run_build_writes_outputs_and_reports_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let tokens = dir.path().join("tokens.toml");
        std::fs::write(&tokens, include_str!("../styles/tokens.toml")).unwrap();

        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("base.css"), stylesheet::template::BASE_TEMPLATE).unwrap();
        std::fs::write(templates.join("preview.css"), stylesheet::template::PREVIEW_TEMPLATE)
            .unwrap();
        std::fs::write(
            templates.join("print.css"),
            format!(
                "{}\n.section {{ margin-top: 1cm; }}\n",
                stylesheet::template::PRINT_TEMPLATE
            ),
        )
        .unwrap();

        let out_dir = dir.path().join("out");
        let mut config = Config::from_env().unwrap();
        config.tokens_path = tokens;
        config.out_dir = out_dir.clone();
        config.template_dir = Some(templates);
        config.mode = BuildMode::Strict;

        let err = run_build(&config).await.unwrap_err();
        assert_eq!(exit_code(&err), 3);
        assert!(out_dir.join("report.json").exists());
        assert!(!out_dir.join("print.css").exists());

        config.mode = BuildMode::Lenient;
        run_build(&config).await.unwrap();
        assert!(out_dir.join("print.css").exists());
        assert!(out_dir.join("preview.css").exists());

        // a later strict failure must not leave the lenient stylesheets behind
        config.mode = BuildMode::Strict;
        assert_eq!(exit_code(&run_build(&config).await.unwrap_err()), 3);
        assert!(out_dir.join("report.json").exists());
        assert!(!out_dir.join("print.css").exists());
        assert!(!out_dir.join("preview.css").exists());
    }

    #[tokio::test]
    async fn test_missing_token_source_is_exit_1() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env().unwrap();
        config.tokens_path = dir.path().join("absent.toml");
        config.out_dir = dir.path().join("out");
        let err = run_build(&config).await.unwrap_err();
        assert_eq!(exit_code(&err), 1);
        assert!(format!("{err:#}").contains("absent.toml"));
    }
}
