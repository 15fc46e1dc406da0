//! Mapping from the raw `/predict` payload to a display-ready [`Prediction`].

use crate::error::ScanError;
use crate::model::{ClassLabel, ClassScore, PredictResponse, Prediction, QualityBucket};

/// Interpret a raw backend payload.
///
/// The `scores` array must be positionally aligned with
/// [`ClassLabel::VOCABULARY`]; a payload of any other shape is rejected rather
/// than padded or truncated.
pub fn interpret(raw: &PredictResponse) -> Result<Prediction, ScanError> {
    let expected = ClassLabel::VOCABULARY.len();
    if raw.scores.len() != expected {
        return Err(ScanError::validation(format!(
            "Unexpected response from server: expected {} scores, got {}",
            expected,
            raw.scores.len()
        )));
    }
    if let Some(bad) = raw
        .scores
        .iter()
        .find(|s| !s.is_finite() || **s < 0.0 || **s > 1.0)
    {
        return Err(ScanError::validation(format!(
            "Unexpected response from server: score {bad} is outside [0, 1]"
        )));
    }

    let predicted_class = ClassLabel::from_wire_str(&raw.predicted_class_name).ok_or_else(|| {
        ScanError::validation(format!(
            "Unexpected response from server: unknown class '{}'",
            raw.predicted_class_name
        ))
    })?;

    let confidence_score = raw.scores.iter().copied().fold(f64::MIN, f64::max);

    let per_class_scores = ClassLabel::VOCABULARY
        .iter()
        .zip(raw.scores.iter())
        .map(|(label, score)| ClassScore {
            label: *label,
            display_name: label.display_name().to_string(),
            score: *score,
        })
        .collect();

    Ok(Prediction {
        predicted_class,
        display_name: predicted_class.display_name().to_string(),
        confidence_score,
        is_normal: predicted_class == ClassLabel::Normal,
        per_class_scores,
        quality_bucket: QualityBucket::from_confidence(confidence_score),
    })
}
