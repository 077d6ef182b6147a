use serde_json::Value;

/// Used when a model omits its self-reported confidence.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Arithmetic mean of `scores`, clamped to [0, 1]. An empty slice scores 0.
pub fn aggregate(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    clamp_unit(mean)
}

/// Overall score of a run: the mean of the three stage-level scores only.
pub fn overall_confidence(case_summary: f64, soap_note: f64, diagnosis: f64) -> f64 {
    aggregate(&[case_summary, soap_note, diagnosis])
}

/// Read a model-reported confidence. Numbers and numeric strings are accepted;
/// anything else falls back to [`DEFAULT_CONFIDENCE`].
pub fn normalize_score(raw: Option<&Value>) -> f64 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|v| {
            if s.trim().ends_with('%') { v / 100.0 } else { v }
        }),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .map(clamp_unit)
        .unwrap_or(DEFAULT_CONFIDENCE)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
