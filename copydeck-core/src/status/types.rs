use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::StatusError;

/// A pipeline stage, in the order sections move through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Analyze,
    Improve,
    Review,
    Implement,
}

impl Stage {
    /// All stages in pipeline order, which is also tie-break priority.
    pub const ALL: [Stage; 4] = [Stage::Analyze, Stage::Improve, Stage::Review, Stage::Implement];

    /// The stage that must have completed before this one.
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Stage::Analyze => None,
            Stage::Improve => Some(Stage::Analyze),
            Stage::Review => Some(Stage::Improve),
            Stage::Implement => Some(Stage::Review),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Improve => "improve",
            Stage::Review => "review",
            Stage::Implement => "implement",
        }
    }

    /// Verb used in status history events.
    pub(crate) fn completed_action(self) -> &'static str {
        match self {
            Stage::Analyze => "analyzed",
            Stage::Improve => "improved",
            Stage::Review => "reviewed",
            Stage::Implement => "implemented",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StatusError::UnknownStage(s.to_string()))
    }
}

/// Outcome of a human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    Partial,
}

impl ReviewDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
            ReviewDecision::Partial => "partial",
        }
    }
}

impl Display for ReviewDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewDecision {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(ReviewDecision::Approved),
            "rejected" | "reject" => Ok(ReviewDecision::Rejected),
            "partial" => Ok(ReviewDecision::Partial),
            _ => Err(StatusError::UnknownDecision(s.to_string())),
        }
    }
}

/// Furthest stage a section has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionState {
    Pending,
    Analyzed,
    Improved,
    Reviewed,
    Implemented,
}

/// Persisted progress of one section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    #[serde(default)]
    pub analyzed: bool,
    #[serde(default)]
    pub improved: bool,
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub implemented: bool,
    #[serde(default)]
    pub review_decision: Option<ReviewDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implemented_at: Option<DateTime<Utc>>,
    /// Set by a rejection; cleared by the next improve completion.
    #[serde(default)]
    pub awaiting_rework: bool,
}

impl SectionRecord {
    pub fn is_complete(&self, stage: Stage) -> bool {
        match stage {
            Stage::Analyze => self.analyzed,
            Stage::Improve => self.improved,
            Stage::Review => self.reviewed,
            Stage::Implement => self.implemented,
        }
    }

    pub fn state(&self) -> SectionState {
        if self.implemented {
            SectionState::Implemented
        } else if self.reviewed {
            SectionState::Reviewed
        } else if self.improved {
            SectionState::Improved
        } else if self.analyzed {
            SectionState::Analyzed
        } else {
            SectionState::Pending
        }
    }

    /// `implemented ⇒ reviewed ⇒ improved ⇒ analyzed`.
    pub fn is_monotonic(&self) -> bool {
        (!self.implemented || self.reviewed)
            && (!self.reviewed || self.improved)
            && (!self.improved || self.analyzed)
    }

    pub(crate) fn mark_complete(&mut self, stage: Stage, at: DateTime<Utc>) {
        match stage {
            Stage::Analyze => {
                self.analyzed = true;
                self.analyzed_at = Some(at);
            }
            Stage::Improve => {
                self.improved = true;
                self.improved_at = Some(at);
                self.awaiting_rework = false;
            }
            Stage::Review => {
                self.reviewed = true;
                self.reviewed_at = Some(at);
            }
            Stage::Implement => {
                self.implemented = true;
                self.implemented_at = Some(at);
            }
        }
    }
}

/// One line of the status audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub timestamp: DateTime<Utc>,
    pub section: String,
    pub action: String,
}

/// What the pipeline should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Analyze,
    Improve,
    Review,
    Implement,
    Complete,
}

impl NextAction {
    pub fn stage(self) -> Option<Stage> {
        match self {
            NextAction::Analyze => Some(Stage::Analyze),
            NextAction::Improve => Some(Stage::Improve),
            NextAction::Review => Some(Stage::Review),
            NextAction::Implement => Some(Stage::Implement),
            NextAction::Complete => None,
        }
    }
}

impl From<Stage> for NextAction {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Analyze => NextAction::Analyze,
            Stage::Improve => NextAction::Improve,
            Stage::Review => NextAction::Review,
            Stage::Implement => NextAction::Implement,
        }
    }
}

impl Display for NextAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.stage() {
            Some(stage) => f.write_str(stage.as_str()),
            None => f.write_str("complete"),
        }
    }
}

/// Counts of sections per completed stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusStats {
    pub total: usize,
    pub analyzed: usize,
    pub improved: usize,
    pub reviewed: usize,
    pub implemented: usize,
    pub awaiting_rework: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_is_case_insensitive() {
        assert_eq!("Review".parse::<Stage>().unwrap(), Stage::Review);
        assert!(matches!(
            "publish".parse::<Stage>(),
            Err(StatusError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_state_follows_furthest_flag() {
        let mut record = SectionRecord::default();
        assert_eq!(record.state(), SectionState::Pending);
        record.mark_complete(Stage::Analyze, Utc::now());
        record.mark_complete(Stage::Improve, Utc::now());
        assert_eq!(record.state(), SectionState::Improved);
        assert!(record.is_monotonic());
    }

    #[test]
    fn test_record_reads_minimal_json() {
        let record: SectionRecord =
            serde_json::from_str(r#"{"analyzed": true, "reviewDecision": null}"#).unwrap();
        assert!(record.analyzed);
        assert!(!record.awaiting_rework);
        assert_eq!(record.review_decision, None);
    }
}
