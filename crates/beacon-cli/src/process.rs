//! `beacon process`: run work requests from a file.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use beacon_engine::{EngineConfig, ProcessingEngine, WorkRequest};
use beacon_settings::BeaconSettings;
use clap::Args;
use serde_json::Value;
use tracing::{info, warn};

use crate::output::value_text;

/// Arguments for `beacon process`.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// JSON file holding one request object or an array of them.
    pub file: PathBuf,

    /// Worker threads (overrides `engine.workers`).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Indent each response.
    #[arg(long)]
    pub pretty: bool,
}

/// Run every request and print one response per line, in request order.
pub async fn run(settings: &BeaconSettings, args: ProcessArgs) -> Result<()> {
    let requests = read_requests(&args.file)?;
    let mut config = EngineConfig::from(&settings.engine);
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    info!(requests = requests.len(), workers = config.workers, "processing");

    let engine = ProcessingEngine::spawn(config);
    let responses = engine.run(requests).await;
    engine.shutdown().await;

    let mut stdout = std::io::stdout().lock();
    let mut failed = 0_usize;
    for response in responses {
        let response = response.context("Engine rejected request")?;
        if !response.success {
            failed += 1;
        }
        writeln!(stdout, "{}", value_text(&response, args.pretty)?)?;
    }
    if failed > 0 {
        warn!(failed, "some requests failed");
    }
    Ok(())
}

/// Read and parse `path`.
pub fn read_requests(path: &Path) -> Result<Vec<WorkRequest>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_requests(&text).with_context(|| format!("Invalid requests in {}", path.display()))
}

/// A single request object, or an array of request objects.
pub fn parse_requests(text: &str) -> Result<Vec<WorkRequest>> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item).with_context(|| format!("request #{index}"))
            })
            .collect(),
        Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        other => bail!("expected a request object or array, got {other}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_engine::Operation;

    #[test]
    fn single_request() {
        let requests =
            parse_requests(r#"{"id": "a", "type": "sort", "data": [], "options": {"sortBy": "v"}}"#).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].operation, Operation::Sort);
    }

    #[test]
    fn request_array() {
        let requests = parse_requests(
            r#"[{"id": "a", "type": "filter"}, {"id": "b", "type": "analyze", "options": {"fields": ["x"]}}]"#,
        )
        .unwrap();
        let ids: Vec<&str> = requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn bad_entry_is_named() {
        let err = parse_requests(r#"[{"id": "a", "type": "filter"}, {"id": "b", "type": "pivot"}]"#).unwrap_err();
        assert!(format!("{err:#}").contains("request #1"));
    }

    #[test]
    fn scalars_rejected() {
        assert!(parse_requests("42").is_err());
        assert!(parse_requests("not json").is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.json");
        std::fs::write(&path, r#"{"id": "f", "type": "analyze", "options": {"fields": ["x"]}}"#).unwrap();
        let requests = read_requests(&path).unwrap();
        assert_eq!(requests[0].id, "f");

        let missing = read_requests(&dir.path().join("nope.json")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read"));
    }
}
