use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EvaluationMode {
    Omr,
    Descriptive,
    Mixed,
}

impl EvaluationMode {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "omr" => Some(Self::Omr),
            "descriptive" => Some(Self::Descriptive),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Omr => "omr",
            Self::Descriptive => "descriptive",
            Self::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ScriptFormat {
    Handwritten,
    Digital,
}

impl ScriptFormat {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "handwritten" => Some(Self::Handwritten),
            "digital" => Some(Self::Digital),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Handwritten => "handwritten",
            Self::Digital => "digital",
        }
    }
}

/// Scores and feedback for one script. Keys the model adds beyond the
/// documented ones are kept as-is.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct EvaluationResult {
    pub(crate) scores: ScoreSheet,
    pub(crate) feedback: FeedbackSheet,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct ScoreSheet {
    #[serde(default)]
    pub(crate) student_id: Option<String>,
    pub(crate) total_score_awarded: Number,
    #[serde(default)]
    pub(crate) detailed_scores: Vec<DetailedScore>,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct DetailedScore {
    pub(crate) question_number: Number,
    pub(crate) max_marks: Number,
    pub(crate) marks_awarded: Number,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct FeedbackSheet {
    #[serde(default)]
    pub(crate) student_id: Option<String>,
    pub(crate) summary_feedback: String,
    #[serde(default)]
    pub(crate) detailed_feedback: Vec<DetailedFeedback>,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct DetailedFeedback {
    pub(crate) question_number: Number,
    pub(crate) feedback: String,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

impl ScoreSheet {
    pub(crate) fn awarded_sum(&self) -> f64 {
        self.detailed_scores.iter().filter_map(|score| score.marks_awarded.as_f64()).sum()
    }

    /// Whether the per-question marks add up to the reported total.
    pub(crate) fn is_consistent(&self) -> bool {
        match self.total_score_awarded.as_f64() {
            Some(total) => (total - self.awarded_sum()).abs() < 1e-6,
            None => false,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluateResponse {
    pub(crate) success: bool,
    pub(crate) result: EvaluationResult,
}
