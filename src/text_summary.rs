//! Text summary builder for CLI output.
//!
//! Formats a finished session into human-readable lines for text mode.

use crate::model::{format_percent, Prediction};
use crate::session::{Phase, SessionSnapshot};
use anyhow::{bail, Result};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Lines describing a completed classification.
pub(crate) fn prediction_lines(p: &Prediction) -> Vec<String> {
    let mut lines = vec![
        "Processing Complete".to_string(),
        format!("Analysis Result: {}", p.headline()),
        format!("Confidence: {}", format_percent(p.confidence_score)),
        format!("Scan Quality: {}", p.quality_bucket.as_str()),
        "Detailed Analysis:".to_string(),
    ];
    for s in &p.per_class_scores {
        lines.push(format!("  {}: {}", s.display_name, format_percent(s.score)));
    }
    lines.push(p.medical_note().to_string());
    lines
}

/// Build a text summary from a finished session snapshot.
///
/// Fails with the session's error message when the attempt did not complete,
/// so text mode exits non-zero on failure.
pub(crate) fn build_text_summary(snapshot: &SessionSnapshot) -> Result<TextSummary> {
    match (snapshot.phase, snapshot.result.as_ref()) {
        (Phase::Complete, Some(p)) => {
            let mut lines = Vec::new();
            if let Some(file) = snapshot.selected_file.as_ref() {
                lines.push(format!("File: {}", file.name));
            }
            lines.extend(prediction_lines(p));
            Ok(TextSummary { lines })
        }
        (Phase::Failed, _) => bail!(
            "{}",
            snapshot
                .error_message
                .as_deref()
                .unwrap_or(crate::error::GENERIC_FAILURE)
        ),
        (phase, _) => bail!("scan did not finish (phase: {phase:?})"),
    }
}
