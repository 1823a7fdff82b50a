//! Writes build outputs to their fixed paths under the output directory.
//!
//! Files are only rewritten when their bytes change, so an unchanged token source
//! leaves modification times alone.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::StyleError;
use crate::pipeline::artifact::Target;
use crate::pipeline::orchestrator::BuildOutput;
use crate::validate::report::DivergenceReport;

pub const PREVIEW_FILE: &str = "preview.css";
pub const PRINT_FILE: &str = "print.css";
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    /// False when the file already held identical bytes.
    pub changed: bool,
}

/// Writes `preview.css`, `print.css` and `report.json`. The document tree is not written.
pub fn write_artifacts(output: &BuildOutput, out_dir: &Path) -> Result<Vec<WrittenFile>, StyleError> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();
    for (target, file) in [(Target::Preview, PREVIEW_FILE), (Target::Print, PRINT_FILE)] {
        let css = output
            .artifact(target)
            .and_then(|a| a.stylesheet())
            .ok_or_else(|| StyleError::Internal(format!("build output has no {target} stylesheet")))?;
        written.push(write_if_changed(&out_dir.join(file), css.as_bytes())?);
    }
    written.push(write_report(&output.report, out_dir)?);

    info!(
        out_dir = %out_dir.display(),
        changed = written.iter().filter(|w| w.changed).count(),
        "Artifacts written"
    );
    Ok(written)
}

/// Writes `report.json` alone (used when a strict build fails on divergence).
pub fn write_report(report: &DivergenceReport, out_dir: &Path) -> Result<WrittenFile, StyleError> {
    std::fs::create_dir_all(out_dir)?;
    let mut json = serde_json::to_string_pretty(report)
        .map_err(|e| StyleError::Internal(format!("failed to serialize report: {e}")))?;
    json.push('\n');
    write_if_changed(&out_dir.join(REPORT_FILE), json.as_bytes())
}

/// Deletes `preview.css` and `print.css` left by an earlier build. Returns the
/// paths that were removed.
pub fn remove_stale_stylesheets(out_dir: &Path) -> Result<Vec<PathBuf>, StyleError> {
    let mut removed = Vec::new();
    for file in [PREVIEW_FILE, PRINT_FILE] {
        let path = out_dir.join(file);
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<WrittenFile, StyleError> {
    let unchanged = match std::fs::read(path) {
        Ok(existing) => existing == bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };
    if !unchanged {
        std::fs::write(path, bytes)?;
    }
    debug!(path = %path.display(), changed = !unchanged, "Output file");
    Ok(WrittenFile {
        path: path.to_path_buf(),
        changed: !unchanged,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::orchestrator::{build_all, BuildOptions};
    use crate::tokens::snapshot::TokenSnapshot;

    const TOKENS: &str = include_str!("../../styles/tokens.toml");

    async fn output() -> BuildOutput {
        let snapshot = Arc::new(TokenSnapshot::load(TOKENS).unwrap());
        build_all(snapshot, &BuildOptions::builtin().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_writes_three_fixed_files() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("dist/styles");
        let written = write_artifacts(&output().await, &out_dir).unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|w| w.changed));

        let print = std::fs::read_to_string(out_dir.join(PRINT_FILE)).unwrap();
        assert!(print.contains("padding-left: 0.3881cm;"));
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out_dir.join(REPORT_FILE)).unwrap())
                .unwrap();
        assert_eq!(report["verdict"], "consistent");
        assert_eq!(report["render"]["status"], "ran");
    }

    #[tokio::test]
    async fn test_second_write_of_same_build_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_artifacts(&output().await, dir.path()).unwrap();
        let before: Vec<Vec<u8>> = first.iter().map(|w| std::fs::read(&w.path).unwrap()).collect();

        let second = write_artifacts(&output().await, dir.path()).unwrap();
        assert!(second.iter().all(|w| !w.changed));
        let after: Vec<Vec<u8>> = second.iter().map(|w| std::fs::read(&w.path).unwrap()).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_remove_stale_stylesheets_keeps_report() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(&output().await, dir.path()).unwrap();

        let removed = remove_stale_stylesheets(dir.path()).unwrap();
        assert_eq!(
            removed,
            vec![dir.path().join(PREVIEW_FILE), dir.path().join(PRINT_FILE)]
        );
        assert!(dir.path().join(REPORT_FILE).exists());
        assert!(remove_stale_stylesheets(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_report_alone() {
        let dir = tempfile::tempdir().unwrap();
        let output = output().await;
        let written = write_report(&output.report, dir.path()).unwrap();
        assert_eq!(written.path, dir.path().join(REPORT_FILE));
        assert!(!dir.path().join(PRINT_FILE).exists());
    }
}
