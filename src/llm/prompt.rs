//! Diagnosis prompt text.

/// System prompt for every diagnosis run.
///
/// Asks for a bare JSON object so replies can be parsed without scraping.
pub const DIAGNOSIS_SYSTEM_PROMPT: &str = "You are an agricultural disease detection API. \
Respond ONLY with raw JSON. Do not include markdown, text, or explanations. \
Keys: condition_name (string, the disease, pest, or deficiency; use \"Healthy\" if none), \
confidence (number from 0.0 to 1.0), symptoms (string), organic_treatment (string), \
chemical_treatment (string), prevention (string), next_steps (array of strings).";

/// User prompt accompanying the image.
pub const DIAGNOSIS_USER_PROMPT: &str = "Identify the plant disease shown in this image.";

/// Sampling temperature for diagnosis runs.
///
/// Zero keeps runs as deterministic as the provider allows; the remaining
/// variance is what the consensus vote absorbs.
pub const DIAGNOSIS_TEMPERATURE: f32 = 0.0;
