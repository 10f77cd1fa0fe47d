use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::mutator::ApprovedChange;
use crate::status::ReviewDecision;

/// Findings about one section, produced by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAnalysis {
    pub section: String,
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A candidate rewrite of one field, awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    pub file: String,
    pub field: String,
    pub original: String,
    pub improved: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ProposedChange {
    /// Accept this proposal on behalf of `section`.
    pub fn approve(&self, section: &str) -> ApprovedChange {
        ApprovedChange {
            file: self.file.clone(),
            field: self.field.clone(),
            original: self.original.clone(),
            improved: self.improved.clone(),
            section: Some(section.to_string()),
        }
    }
}

/// Decision from the review surface plus the changes it accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub approved: Vec<ApprovedChange>,
}

/// Scores a section and explains what to improve.
#[async_trait]
pub trait SectionAnalyzer: Send + Sync {
    async fn analyze(&self, section: &str) -> anyhow::Result<SectionAnalysis>;
}

/// Proposes rewrites for a section, usually backed by a language model.
#[async_trait]
pub trait SectionImprover: Send + Sync {
    async fn improve(
        &self,
        section: &str,
        analysis: Option<&SectionAnalysis>,
    ) -> anyhow::Result<Vec<ProposedChange>>;
}

/// Presents proposals to a human and reports the decision.
#[async_trait]
pub trait ReviewSurface: Send + Sync {
    async fn review(
        &self,
        section: &str,
        proposals: &[ProposedChange],
    ) -> anyhow::Result<ReviewOutcome>;
}
