use crate::error::ScanError;
use crate::intake::Preview;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    /// Cosmetic pause between 100% upload and showing the result.
    #[serde(with = "humantime_serde")]
    pub completion_hold: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    /// Absolute URL of the backend's predict endpoint.
    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.server_url.trim_end_matches('/'))
    }
}

/// Diagnostic classes the backend can return. Declaration order is the wire
/// order of the `scores` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    #[serde(rename = "lung_aca")]
    Adenocarcinoma,
    #[serde(rename = "lung_n")]
    Normal,
    #[serde(rename = "lung_scc")]
    SquamousCellCarcinoma,
}

impl ClassLabel {
    pub const VOCABULARY: [ClassLabel; 3] = [
        ClassLabel::Adenocarcinoma,
        ClassLabel::Normal,
        ClassLabel::SquamousCellCarcinoma,
    ];

    pub fn as_wire_str(self) -> &'static str {
        match self {
            ClassLabel::Adenocarcinoma => "lung_aca",
            ClassLabel::Normal => "lung_n",
            ClassLabel::SquamousCellCarcinoma => "lung_scc",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        Self::VOCABULARY
            .into_iter()
            .find(|label| label.as_wire_str() == s)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ClassLabel::Adenocarcinoma => "Adenocarcinoma",
            ClassLabel::Normal => "Normal Lung",
            ClassLabel::SquamousCellCarcinoma => "Squamous Cell Carcinoma",
        }
    }
}

/// Success body of `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_class_name: String,
    pub scores: Vec<f64>,
}

/// Optional error body of `POST /predict`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
}

/// Coarse confidence tier of the top class score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityBucket {
    Excellent,
    Good,
    Fair,
}

impl QualityBucket {
    /// Both thresholds are exclusive: 0.9 is Good and 0.7 is Fair.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.9 {
            QualityBucket::Excellent
        } else if confidence > 0.7 {
            QualityBucket::Good
        } else {
            QualityBucket::Fair
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityBucket::Excellent => "Excellent",
            QualityBucket::Good => "Good",
            QualityBucket::Fair => "Fair",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: ClassLabel,
    pub display_name: String,
    pub score: f64,
}

/// Display-ready classification of one scan. Built once by the interpreter and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_class: ClassLabel,
    pub display_name: String,
    pub confidence_score: f64,
    pub is_normal: bool,
    pub per_class_scores: Vec<ClassScore>,
    pub quality_bucket: QualityBucket,
}

impl Prediction {
    pub fn headline(&self) -> String {
        if self.is_normal {
            "No suspicious nodules detected".to_string()
        } else {
            format!("Potential {} detected", self.display_name)
        }
    }

    pub fn medical_note(&self) -> &'static str {
        if self.is_normal {
            "No concerning patterns found. Routine checkups recommended."
        } else {
            "Consult a medical professional for further evaluation."
        }
    }
}

/// Format a [0,1] score as a percentage with one decimal, e.g. `95.0%`.
pub fn format_percent(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

/// Events produced by background work for one attempt. Every variant carries
/// the generation of the attempt that spawned it.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Progress {
        generation: u64,
        percent: u8,
    },
    PreviewReady {
        generation: u64,
        preview: Preview,
    },
    PreviewFailed {
        generation: u64,
        message: String,
    },
    Succeeded {
        generation: u64,
        // Box to keep ScanEvent small; progress events are far more frequent.
        prediction: Box<Prediction>,
    },
    Failed {
        generation: u64,
        error: ScanError,
    },
    HoldElapsed {
        generation: u64,
    },
}

impl ScanEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ScanEvent::Progress { generation, .. }
            | ScanEvent::PreviewReady { generation, .. }
            | ScanEvent::PreviewFailed { generation, .. }
            | ScanEvent::Succeeded { generation, .. }
            | ScanEvent::Failed { generation, .. }
            | ScanEvent::HoldElapsed { generation } => *generation,
        }
    }
}

/// Structured info events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize)]
pub enum InfoEvent {
    Uploading { file_name: String, url: String },
    Rejected { file_name: String, media_type: String },
    PreviewUnavailable { file_name: String },
    Reset,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Uploading { file_name, url } => {
                format!("Uploading {} to {}", file_name, url)
            }
            InfoEvent::Rejected {
                file_name,
                media_type,
            } => format!("Rejected {} ({})", file_name, media_type),
            InfoEvent::PreviewUnavailable { file_name } => {
                format!("Preview unavailable for {}", file_name)
            }
            InfoEvent::Reset => "Ready for a new image".to_string(),
        }
    }
}
