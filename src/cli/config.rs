//! Config CLI command.

use crate::config::PhytoscanConfig;
use std::fmt::Write as _;

/// Renders the resolved configuration in config-file layout.
///
/// The API key is never printed, only whether one is set.
#[must_use]
pub fn cmd_config(config: &PhytoscanConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "data_dir = {:?}", config.data_dir.display().to_string());
    let _ = writeln!(
        out,
        "database_path = {:?}",
        config.database_path().display().to_string()
    );

    let inference = &config.inference;
    out.push_str("\n[inference]\n");
    let _ = writeln!(out, "provider = \"{}\"", inference.provider);
    let _ = writeln!(
        out,
        "model = {}",
        inference.model.as_deref().map_or_else(|| "(default)".to_string(), |m| format!("{m:?}"))
    );
    let _ = writeln!(
        out,
        "api_key = {}",
        if inference.api_key.is_some() { "(set)" } else { "(unset)" }
    );
    let _ = writeln!(
        out,
        "base_url = {}",
        inference.base_url.as_deref().map_or_else(|| "(default)".to_string(), |u| format!("{u:?}"))
    );
    let _ = writeln!(out, "timeout_ms = {}", inference.timeout_ms);
    let _ = writeln!(out, "connect_timeout_ms = {}", inference.connect_timeout_ms);
    let _ = writeln!(out, "max_tokens = {}", inference.max_tokens);

    out.push_str("\n[consensus]\n");
    let _ = writeln!(out, "runs = {}", config.consensus.runs);
    let _ = writeln!(
        out,
        "run_timeout_ms = {}",
        config.consensus.run_timeout.as_millis()
    );

    out.push_str("\n[deduplication]\n");
    let _ = writeln!(out, "enabled = {}", config.deduplication.enabled);
    let _ = writeln!(out, "near_threshold = {}", config.deduplication.near_threshold);
    let _ = writeln!(out, "candidate_window = {}", config.deduplication.candidate_window);

    out.push_str("\n[matching]\n");
    let _ = writeln!(out, "recommendation_limit = {}", config.matching.recommendation_limit);
    let _ = writeln!(out, "alternatives_limit = {}", config.matching.alternatives_limit);

    out.push_str("\n[pipeline]\n");
    let _ = writeln!(out, "min_image_bytes = {}", config.pipeline.min_image_bytes);
    let _ = writeln!(
        out,
        "near_duplicate_recommendations = {}",
        config.pipeline.near_duplicate_recommendations
    );
    let _ = writeln!(out, "suggest_alternatives = {}", config.pipeline.suggest_alternatives);

    let observability = &config.observability;
    out.push_str("\n[observability]\n");
    let _ = writeln!(
        out,
        "log_format = {}",
        observability
            .log_format
            .map_or("(auto)", |format| match format {
                crate::config::LogFormat::Json => "\"json\"",
                crate::config::LogFormat::Pretty => "\"pretty\"",
            })
    );
    let _ = writeln!(
        out,
        "log_level = {}",
        observability.log_level.as_deref().map_or_else(|| "(default)".to_string(), |l| format!("{l:?}"))
    );
    if let Some(path) = &observability.log_file {
        let _ = writeln!(out, "log_file = {:?}", path.display().to_string());
    }
    let _ = writeln!(out, "metrics_enabled = {}", observability.metrics_enabled);
    let _ = writeln!(out, "metrics_port = {}", observability.metrics_port);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_config_hides_api_key() {
        let mut config = PhytoscanConfig::new();
        config.inference.api_key = Some(SecretString::from("sk-very-secret".to_string()));

        let out = cmd_config(&config);

        assert!(out.contains("api_key = (set)"));
        assert!(!out.contains("sk-very-secret"));
    }

    #[test]
    fn test_config_shows_defaults() {
        let out = cmd_config(&PhytoscanConfig::new());

        assert!(out.contains("provider = \"openai\""));
        assert!(out.contains("runs = 3"));
        assert!(out.contains("run_timeout_ms = 90000"));
        assert!(out.contains("near_threshold = 0.85"));
        assert!(out.contains("min_image_bytes = 1000"));
        assert!(out.contains("near_duplicate_recommendations = false"));
        assert!(out.contains("metrics_port = 9090"));
    }
}
