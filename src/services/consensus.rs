//! Consensus diagnosis over independent inference runs.
//!
//! A single vision-model call is the least reliable link in the pipeline, so
//! the analyzer issues `runs` identical calls concurrently, drops the ones
//! that fail, and votes on the normalized condition name of the survivors.
//!
//! ```text
//!            ┌── consensus-run-1 ──┐
//!   image ───┼── consensus-run-2 ──┼──▶ mpsc ──▶ recv_timeout(deadline) ──▶ reconcile
//!            └── consensus-run-N ──┘
//! ```

use crate::llm::{InferenceImage, VisionProvider};
use crate::models::{DiagnosisCandidate, DiagnosisResult};
use crate::observability::{RequestContext, current_request_id, enter_request_context};
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::instrument;

/// Default number of inference runs per analysis.
pub const DEFAULT_RUNS: usize = 3;

/// Default deadline for the whole batch of runs.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(90);

/// Configuration for the consensus analyzer.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `PHYTOSCAN_CONSENSUS_RUNS` | usize | `3` | Inference runs per analysis |
/// | `PHYTOSCAN_CONSENSUS_RUN_TIMEOUT_MS` | u64 | `90000` | Shared deadline for all runs |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// Number of independent inference runs.
    pub runs: usize,
    /// Deadline shared by all runs; a run still pending when it passes is
    /// counted as failed.
    pub run_timeout: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl ConsensusConfig {
    /// Creates a configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(runs) = std::env::var("PHYTOSCAN_CONSENSUS_RUNS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.runs = runs;
        }
        if let Some(ms) = std::env::var("PHYTOSCAN_CONSENSUS_RUN_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.run_timeout = Duration::from_millis(ms);
        }
        self
    }

    /// Builder method to set the number of runs.
    #[must_use]
    pub const fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }

    /// Builder method to set the batch deadline.
    #[must_use]
    pub const fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }
}

/// Fans out diagnosis runs and reconciles them by majority vote.
pub struct ConsensusAnalyzer {
    provider: Arc<dyn VisionProvider>,
    config: ConsensusConfig,
}

impl ConsensusAnalyzer {
    /// Creates an analyzer over a shared provider handle.
    #[must_use]
    pub fn new(provider: Arc<dyn VisionProvider>, config: ConsensusConfig) -> Self {
        Self { provider, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Runs the configured number of diagnoses and votes on the result.
    ///
    /// All runs are joined (or time out) before voting; there is no early
    /// exit on the first success.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `runs` is zero
    /// - [`Error::AllRunsFailed`] if no run produced a parseable diagnosis
    #[instrument(
        skip(self, image),
        fields(
            operation = "consensus_analyze",
            provider = self.provider.name(),
            runs = self.config.runs
        )
    )]
    pub fn analyze(&self, image: &InferenceImage) -> Result<DiagnosisResult> {
        let runs = self.config.runs;
        if runs == 0 {
            return Err(Error::InvalidInput(
                "consensus requires at least one run".to_string(),
            ));
        }

        let start = Instant::now();
        let (candidates, last_error) = self.collect_runs(image);

        let duration_ms = start.elapsed().as_millis();
        #[allow(clippy::cast_precision_loss)]
        metrics::histogram!("consensus_duration_ms").record(duration_ms as f64);

        let Some(result) = reconcile(&candidates) else {
            tracing::warn!(attempted = runs, "Every consensus run failed");
            return Err(Error::AllRunsFailed {
                attempted: runs,
                cause: last_error.unwrap_or_else(|| "no runs completed".to_string()),
            });
        };

        if result.needs_review {
            metrics::counter!("consensus_needs_review_total").increment(1);
        }
        tracing::info!(
            condition = %result.condition_name,
            consensus_count = result.consensus_count,
            total_runs = result.total_runs,
            consensus_confidence = result.consensus_confidence,
            needs_review = result.needs_review,
            duration_ms = u64::try_from(duration_ms).unwrap_or(u64::MAX),
            "Consensus reached"
        );
        Ok(result)
    }

    /// Spawns one worker per run and gathers survivors in completion order.
    ///
    /// Returns the surviving candidates and the last recorded failure.
    fn collect_runs(&self, image: &InferenceImage) -> (Vec<DiagnosisCandidate>, Option<String>) {
        let runs = self.config.runs;
        let (tx, rx) = mpsc::channel::<(usize, Result<DiagnosisCandidate>)>();
        let parent_span = tracing::Span::current();
        let request_id = current_request_id();
        let mut last_error = None;
        let mut spawned = 0;

        for run in 1..=runs {
            let tx = tx.clone();
            let provider = Arc::clone(&self.provider);
            let image = image.clone();
            let parent_span = parent_span.clone();
            let request_id = request_id.clone();

            let spawn = std::thread::Builder::new()
                .name(format!("consensus-run-{run}"))
                .spawn(move || {
                    let _request_guard = request_id
                        .map(RequestContext::from_id)
                        .map(enter_request_context);
                    let _parent = parent_span.enter();
                    let span = tracing::debug_span!("consensus.run", run);
                    let _guard = span.enter();
                    let result = provider.diagnose(&image);
                    // Receiver is gone once the deadline passes
                    let _ = tx.send((run, result));
                });

            match spawn {
                Ok(_) => spawned += 1,
                Err(e) => {
                    tracing::warn!(run, error = %e, "Failed to spawn consensus worker");
                    metrics::counter!("consensus_runs_total", "status" => "error").increment(1);
                    last_error = Some(format!("spawn failed: {e}"));
                },
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.config.run_timeout;
        let mut candidates = Vec::with_capacity(spawned);
        let mut settled = 0;

        while settled < spawned {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((run, Ok(candidate))) => {
                    settled += 1;
                    metrics::counter!("consensus_runs_total", "status" => "success").increment(1);
                    tracing::debug!(run, condition = %candidate.condition_name, "Consensus run succeeded");
                    candidates.push(candidate);
                },
                Ok((run, Err(e))) => {
                    settled += 1;
                    metrics::counter!("consensus_runs_total", "status" => "error").increment(1);
                    tracing::warn!(run, error = %e, "Consensus run failed");
                    last_error = Some(e.to_string());
                },
                Err(RecvTimeoutError::Timeout) => {
                    let pending = spawned - settled;
                    // Pending workers finish in the background
                    metrics::counter!("consensus_runs_total", "status" => "timeout")
                        .increment(pending as u64);
                    tracing::warn!(
                        pending,
                        timeout_ms = u64::try_from(self.config.run_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                        "Consensus runs timed out"
                    );
                    last_error = Some(format!(
                        "{pending} run(s) exceeded the {}ms deadline",
                        self.config.run_timeout.as_millis()
                    ));
                    break;
                },
                Err(RecvTimeoutError::Disconnected) => {
                    let lost = spawned - settled;
                    metrics::counter!("consensus_runs_total", "status" => "disconnected")
                        .increment(lost as u64);
                    tracing::warn!(lost, "Consensus workers exited without reporting");
                    last_error = Some(format!("{lost} run(s) exited without a result"));
                    break;
                },
            }
        }

        (candidates, last_error)
    }
}

/// Reconciles surviving candidates into one consensus result.
///
/// Names are compared after trimming and lower-casing. The most frequent
/// name wins; among tied names the one seen first wins. Fields are taken
/// from the first candidate carrying the winning name, and `total_runs`
/// counts only the candidates given here.
///
/// Returns `None` when `candidates` is empty.
#[must_use]
pub fn reconcile(candidates: &[DiagnosisCandidate]) -> Option<DiagnosisResult> {
    // (normalized name, count, index of first candidate), in first-seen order
    let mut tally: Vec<(String, usize, usize)> = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let name = candidate.normalized_name();
        match tally.iter_mut().find(|(seen, _, _)| *seen == name) {
            Some(entry) => entry.1 += 1,
            None => tally.push((name, 1, index)),
        }
    }

    // Strict comparison keeps the earliest name on ties
    let (_, count, first_index) = tally
        .into_iter()
        .reduce(|best, next| if next.1 > best.1 { next } else { best })?;

    let winner = &candidates[first_index];
    let display_name = winner.condition_name.trim().to_string();
    Some(DiagnosisResult::from_vote(
        winner.clone(),
        display_name,
        count,
        candidates.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(list: &[&str]) -> Vec<DiagnosisCandidate> {
        list.iter().map(|n| DiagnosisCandidate::named(*n)).collect()
    }

    /// Replies from a script, one entry per call; `None` fails the call.
    struct ScriptedProvider {
        replies: Mutex<Vec<Option<String>>>,
        delay: Option<(usize, Duration)>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(replies: &[Option<&str>]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.map(String::from)).collect()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_slow_call(mut self, call: usize, delay: Duration) -> Self {
            self.delay = Some((call, delay));
            self
        }
    }

    impl VisionProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn complete_with_image(&self, _: &str, _: &str, _: &InferenceImage) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop().flatten();
            if let Some((slow, delay)) = self.delay {
                if slow == call {
                    std::thread::sleep(delay);
                }
            }
            reply.ok_or_else(|| Error::InferenceRunFailed {
                operation: "scripted_request".to_string(),
                cause: "scripted failure".to_string(),
            })
        }
    }

    fn analyzer(provider: ScriptedProvider, runs: usize) -> ConsensusAnalyzer {
        ConsensusAnalyzer::new(
            Arc::new(provider),
            ConsensusConfig::default()
                .with_runs(runs)
                .with_run_timeout(Duration::from_secs(5)),
        )
    }

    fn image() -> InferenceImage {
        InferenceImage::from_jpeg_bytes(&[0xFF, 0xD8])
    }

    #[test]
    fn test_reconcile_majority() {
        let result = reconcile(&names(&["Leaf Blight", "Leaf Blight", "Rust"])).unwrap();
        assert_eq!(result.condition_name, "Leaf Blight");
        assert_eq!(result.consensus_count, 2);
        assert_eq!(result.total_runs, 3);
        assert!((result.consensus_confidence - 2.0 / 3.0).abs() < 1e-9);
        assert!(!result.needs_review);
    }

    #[test]
    fn test_reconcile_normalizes_names() {
        let result = reconcile(&names(&["  rust ", "Rust", "RUST"])).unwrap();
        assert_eq!(result.condition_name, "rust");
        assert_eq!(result.consensus_count, 3);
        assert!((result.consensus_confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reconcile_tie_keeps_first_seen() {
        let result = reconcile(&names(&["Rust", "Leaf Blight", "Leaf Blight", "Rust"])).unwrap();
        assert_eq!(result.condition_name, "Rust");
        assert_eq!(result.consensus_count, 2);
        assert!(result.needs_review);
    }

    #[test]
    fn test_reconcile_all_different_needs_review() {
        let result = reconcile(&names(&["Rust", "Mildew", "Scab"])).unwrap();
        assert_eq!(result.condition_name, "Rust");
        assert_eq!(result.consensus_count, 1);
        assert!(result.needs_review);
    }

    #[test]
    fn test_reconcile_fields_from_first_winner() {
        let mut first = DiagnosisCandidate::named("Rust");
        first.symptoms = "orange pustules".to_string();
        let mut second = DiagnosisCandidate::named("Leaf Blight");
        second.symptoms = "brown lesions".to_string();
        let mut third = DiagnosisCandidate::named("leaf blight");
        third.symptoms = "later lesions".to_string();

        let result = reconcile(&[first, second, third]).unwrap();
        assert_eq!(result.condition_name, "Leaf Blight");
        assert_eq!(result.symptoms, "brown lesions");
    }

    #[test]
    fn test_reconcile_empty() {
        assert!(reconcile(&[]).is_none());
    }

    #[test]
    fn test_analyze_majority() {
        let provider = ScriptedProvider::new(&[
            Some(r#"{"condition_name": "Leaf Blight", "confidence": 0.9}"#),
            Some(r#"{"condition_name": "Leaf Blight", "confidence": 0.8}"#),
            Some(r#"{"condition_name": "Rust", "confidence": 0.7}"#),
        ]);
        let result = analyzer(provider, 3).analyze(&image()).unwrap();
        assert_eq!(result.condition_name, "Leaf Blight");
        assert_eq!(result.consensus_count, 2);
        assert_eq!(result.total_runs, 3);
    }

    #[test]
    fn test_analyze_partial_failure() {
        let provider = ScriptedProvider::new(&[
            Some(r#"{"condition_name": "Rust"}"#),
            None,
            Some(r#"{"condition_name": "Rust"}"#),
        ]);
        let result = analyzer(provider, 3).analyze(&image()).unwrap();
        assert_eq!(result.condition_name, "Rust");
        assert_eq!(result.total_runs, 2);
        assert_eq!(result.consensus_count, 2);
        assert!(!result.needs_review);
    }

    #[test]
    fn test_analyze_parse_failure_is_run_failure() {
        let provider = ScriptedProvider::new(&[
            Some("I am not sure what this is."),
            Some(r#"{"condition_name": "Scab"}"#),
            Some(r#"{"confidence": 0.5}"#),
        ]);
        let result = analyzer(provider, 3).analyze(&image()).unwrap();
        assert_eq!(result.condition_name, "Scab");
        assert_eq!(result.total_runs, 1);
    }

    #[test]
    fn test_analyze_all_failed() {
        let provider = ScriptedProvider::new(&[None, None, None]);
        let err = analyzer(provider, 3).analyze(&image()).unwrap_err();
        assert!(matches!(err, Error::AllRunsFailed { attempted: 3, .. }));
    }

    #[test]
    fn test_analyze_zero_runs_rejected() {
        let provider = ScriptedProvider::new(&[]);
        let err = analyzer(provider, 0).analyze(&image()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_slow_run_counts_as_failed() {
        let provider = ScriptedProvider::new(&[
            Some(r#"{"condition_name": "Rust"}"#),
            Some(r#"{"condition_name": "Rust"}"#),
            Some(r#"{"condition_name": "Mildew"}"#),
        ])
        .with_slow_call(2, Duration::from_secs(3));
        let analyzer = ConsensusAnalyzer::new(
            Arc::new(provider),
            ConsensusConfig::default()
                .with_runs(3)
                .with_run_timeout(Duration::from_millis(500)),
        );

        let start = Instant::now();
        let result = analyzer.analyze(&image()).unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(result.total_runs, 2);
    }

    #[test]
    fn test_config_builders() {
        let config = ConsensusConfig::default()
            .with_runs(5)
            .with_run_timeout(Duration::from_millis(10));
        assert_eq!(config.runs, 5);
        assert_eq!(config.run_timeout, Duration::from_millis(10));
    }
}
