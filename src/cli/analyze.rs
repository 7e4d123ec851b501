//! Analyze and show CLI commands.

use super::{build_vision_provider, open_store, read_image, to_json};
use crate::config::PhytoscanConfig;
use crate::llm::VisionProvider;
use crate::models::{DiagnosisResult, OwnerId, ProductId, Recommendation, ScanId};
use crate::services::{AnalysisPipeline, ScanReport, SubmitOutcome, lookup_scan};
use crate::storage::{CatalogReader, ScanStore, SqliteStore};
use crate::Result;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// Owner recorded when `--owner` is not given.
const DEFAULT_OWNER: &str = "local";

/// Runs the full pipeline on an image file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the pipeline rejects it.
pub fn cmd_analyze(
    config: &PhytoscanConfig,
    image: &Path,
    owner: Option<&str>,
    json: bool,
) -> Result<String> {
    let store = open_store(config)?;
    let provider = build_vision_provider(&config.inference);
    analyze_with(config, &store, provider, image, owner, json)
}

/// Shows a stored scan. Only the store is opened.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn cmd_show(config: &PhytoscanConfig, scan_id: &str, json: bool) -> Result<String> {
    let store = open_store(config)?;
    show_with(&store, scan_id, json)
}

fn pipeline_for(
    config: &PhytoscanConfig,
    store: &Arc<SqliteStore>,
    provider: Arc<dyn VisionProvider>,
) -> AnalysisPipeline {
    AnalysisPipeline::new(
        Arc::clone(store) as Arc<dyn ScanStore>,
        Arc::clone(store) as Arc<dyn CatalogReader>,
        provider,
        config,
    )
}

fn analyze_with(
    config: &PhytoscanConfig,
    store: &Arc<SqliteStore>,
    provider: Arc<dyn VisionProvider>,
    image: &Path,
    owner: Option<&str>,
    json: bool,
) -> Result<String> {
    let bytes = read_image(image)?;
    let owner = OwnerId::new(owner.unwrap_or(DEFAULT_OWNER));
    let outcome = pipeline_for(config, store, provider).submit(&bytes, &owner)?;

    if json {
        return to_json(&outcome);
    }
    Ok(render_outcome(&outcome, &product_names(store)?))
}

fn show_with(store: &SqliteStore, scan_id: &str, json: bool) -> Result<String> {
    let report = lookup_scan(store, &ScanId::new(scan_id))?;
    let Some(report) = report else {
        return Ok(format!("Scan not found: {scan_id}\n"));
    };

    if json {
        return to_json(&report);
    }
    Ok(render_report(&report, &product_names(store)?))
}

fn product_names(store: &SqliteStore) -> Result<HashMap<ProductId, String>> {
    Ok(store
        .list_products()?
        .into_iter()
        .map(|entry| (entry.id, entry.name))
        .collect())
}

fn render_outcome(outcome: &SubmitOutcome, names: &HashMap<ProductId, String>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Scan: {}", outcome.scan_id);
    if let (Some(kind), Some(original)) = (outcome.duplicate_kind, &outcome.original_scan_id) {
        let similarity = outcome.similarity.unwrap_or(1.0);
        let _ = writeln!(
            out,
            "Duplicate: {kind} match of {original} (similarity {similarity:.2})"
        );
    }
    render_diagnosis(&mut out, &outcome.diagnosis);
    render_recommendations(&mut out, &outcome.recommendations, names);

    if !outcome.has_matches {
        if outcome.alternatives.is_empty() {
            out.push_str("No catalog products match this condition.\n");
        } else {
            let listed: Vec<String> = outcome
                .alternatives
                .iter()
                .map(|alt| format!("{} ({})", alt.condition_name, alt.match_count))
                .collect();
            let _ = writeln!(
                out,
                "No catalog products match this condition. Treatable conditions: {}",
                listed.join(", ")
            );
        }
    }
    out
}

fn render_report(report: &ScanReport, names: &HashMap<ProductId, String>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Scan: {}", report.scan.id);
    let _ = writeln!(out, "Owner: {}", report.scan.owner);
    let _ = writeln!(out, "Created: {}", format_timestamp(report.scan.created_at));
    if let Some(original) = &report.scan.original_scan {
        let _ = writeln!(out, "Duplicate of: {original}");
    }
    match &report.diagnosis {
        Some(diagnosis) => render_diagnosis(&mut out, diagnosis),
        None => out.push_str("Diagnosis: (none)\n"),
    }
    render_recommendations(&mut out, &report.recommendations, names);
    out
}

fn render_diagnosis(out: &mut String, diagnosis: &DiagnosisResult) {
    let _ = writeln!(
        out,
        "Condition: {} (confidence {:.2})",
        diagnosis.condition_name, diagnosis.confidence
    );
    let _ = writeln!(
        out,
        "Consensus: {}/{} runs agreed ({:.0}%){}",
        diagnosis.consensus_count,
        diagnosis.total_runs,
        diagnosis.consensus_confidence * 100.0,
        if diagnosis.needs_review {
            " [needs review]"
        } else {
            ""
        }
    );
    for (label, text) in [
        ("Symptoms", &diagnosis.symptoms),
        ("Organic treatment", &diagnosis.organic_treatment),
        ("Chemical treatment", &diagnosis.chemical_treatment),
        ("Prevention", &diagnosis.prevention),
    ] {
        if !text.trim().is_empty() {
            let _ = writeln!(out, "{label}: {text}");
        }
    }
    if !diagnosis.next_steps.is_empty() {
        out.push_str("Next steps:\n");
        for step in &diagnosis.next_steps {
            let _ = writeln!(out, "  - {step}");
        }
    }
}

fn render_recommendations(
    out: &mut String,
    recommendations: &[Recommendation],
    names: &HashMap<ProductId, String>,
) {
    if recommendations.is_empty() {
        return;
    }
    out.push_str("Recommendations:\n");
    for rec in recommendations {
        let name = names
            .get(&rec.product_id)
            .map_or("(unknown product)", String::as_str);
        let _ = writeln!(out, "  {}. {name} [{}]", rec.rank, rec.product_id);
    }
}

fn format_timestamp(epoch_secs: u64) -> String {
    i64::try_from(epoch_secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map_or_else(|| epoch_secs.to_string(), |dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::test_support::block_bmp;
    use crate::llm::InferenceImage;
    use crate::models::CatalogEntry;
    use crate::Error;
    use tempfile::TempDir;

    const RUST_REPLY: &str = r#"{"condition_name": "Rust", "confidence": 0.9,
        "symptoms": "Orange pustules", "next_steps": ["Remove leaves"]}"#;

    struct Canned(Option<&'static str>);

    impl VisionProvider for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn complete_with_image(&self, _: &str, _: &str, _: &InferenceImage) -> Result<String> {
            self.0.map(String::from).ok_or_else(|| Error::InferenceRunFailed {
                operation: "canned".to_string(),
                cause: "offline".to_string(),
            })
        }
    }

    fn setup() -> (TempDir, PhytoscanConfig, Arc<SqliteStore>) {
        let dir = TempDir::new().unwrap();
        let config = PhytoscanConfig::new().with_data_dir(dir.path());
        let store = open_store(&config).unwrap();
        store
            .upsert_product(&CatalogEntry::new("p4", "Rust Guard", "Fungicide for rust on roses"))
            .unwrap();
        (dir, config, store)
    }

    fn write_image(dir: &TempDir, name: &str, seed: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, block_bmp(seed)).unwrap();
        path
    }

    #[test]
    fn test_analyze_renders_diagnosis_and_recommendations() {
        let (dir, config, store) = setup();
        let image = write_image(&dir, "leaf.bmp", 7);

        let out = analyze_with(&config, &store, Arc::new(Canned(Some(RUST_REPLY))), &image, None, false)
            .unwrap();

        assert!(out.contains("Condition: Rust (confidence 0.90)"));
        assert!(out.contains("Consensus: 3/3 runs agreed (100%)"));
        assert!(out.contains("Symptoms: Orange pustules"));
        assert!(out.contains("  - Remove leaves"));
        assert!(out.contains("1. Rust Guard [p4]"));
        assert!(!out.contains("Duplicate:"));
    }

    #[test]
    fn test_analyze_json_then_show_same_scan() {
        let (dir, config, store) = setup();
        let image = write_image(&dir, "leaf.bmp", 11);

        let out = analyze_with(
            &config,
            &store,
            Arc::new(Canned(Some(RUST_REPLY))),
            &image,
            Some("grower-7"),
            true,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let scan_id = value["scan_id"].as_str().unwrap().to_string();
        assert_eq!(value["is_duplicate"], false);

        let shown = show_with(&store, &scan_id, false).unwrap();
        assert!(shown.contains(&format!("Scan: {scan_id}")));
        assert!(shown.contains("Owner: grower-7"));
        assert!(shown.contains("Condition: Rust"));
    }

    #[test]
    fn test_second_upload_reports_duplicate() {
        let (dir, config, store) = setup();
        let image = write_image(&dir, "leaf.bmp", 3);
        let provider: Arc<dyn VisionProvider> = Arc::new(Canned(Some(RUST_REPLY)));

        analyze_with(&config, &store, Arc::clone(&provider), &image, None, false).unwrap();
        let out = analyze_with(&config, &store, Arc::new(Canned(None)), &image, None, false).unwrap();

        assert!(out.contains("Duplicate: exact match of"));
    }

    #[test]
    fn test_show_unknown_scan() {
        let (_dir, _config, store) = setup();
        let out = show_with(&store, "missing", false).unwrap();
        assert_eq!(out, "Scan not found: missing\n");
    }

    #[test]
    fn test_show_opens_only_the_store() {
        let (dir, mut config, store) = setup();
        let image = write_image(&dir, "leaf.bmp", 5);
        let out = analyze_with(
            &config,
            &store,
            Arc::new(Canned(Some(RUST_REPLY))),
            &image,
            None,
            true,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let scan_id = value["scan_id"].as_str().unwrap().to_string();
        drop(store);

        // No inference backend is configured; showing must not need one
        config.inference.api_key = None;
        config.inference.base_url = Some("http://127.0.0.1:9".to_string());
        let shown = cmd_show(&config, &scan_id, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&shown).unwrap();
        assert_eq!(value["scan"]["id"], scan_id.as_str());
        assert_eq!(value["diagnosis"]["condition_name"], "Rust");
    }

    #[test]
    fn test_analyze_missing_file_is_invalid_input() {
        let (dir, config, store) = setup();
        let err = analyze_with(
            &config,
            &store,
            Arc::new(Canned(Some(RUST_REPLY))),
            &dir.path().join("nope.jpg"),
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
