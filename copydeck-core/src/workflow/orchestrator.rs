use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::collaborators::{
    ProposedChange, ReviewSurface, SectionAnalysis, SectionAnalyzer, SectionImprover,
};
use super::implement::implement_changes;
use super::WorkflowError;
use crate::config::PipelineConfig;
use crate::document::write_json_atomic;
use crate::history::ChangeLog;
use crate::mutator::{
    load_approved_changes, save_approved_changes, ApprovedChange, ApprovedChangesError,
    BatchReport,
};
use crate::status::{Stage, StatusTracker};

/// Where the pipeline as a whole currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    Idle,
    Analyzing,
    Improving,
    Reviewing,
    Implementing,
}

impl From<Stage> for PipelinePhase {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Analyze => PipelinePhase::Analyzing,
            Stage::Improve => PipelinePhase::Improving,
            Stage::Review => PipelinePhase::Reviewing,
            Stage::Implement => PipelinePhase::Implementing,
        }
    }
}

/// A section that did not get through a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionFailure {
    pub section: String,
    pub reason: String,
}

/// Outcome of running one stage over its pending sections.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    /// Sections that completed the stage.
    pub processed: Vec<String>,
    pub failed: Vec<SectionFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchReport>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: Vec::new(),
            failed: Vec::new(),
            batch: None,
        }
    }

    fn fail(&mut self, section: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("{} failed for section '{}': {}", self.stage, section, reason);
        self.failed.push(SectionFailure {
            section: section.to_string(),
            reason,
        });
    }
}

/// External services the orchestrator delegates to.
pub struct Collaborators {
    pub analyzer: Box<dyn SectionAnalyzer>,
    pub improver: Box<dyn SectionImprover>,
    pub reviewer: Box<dyn ReviewSurface>,
}

/// Runs pipeline stages over the sections the tracker reports as pending.
///
/// Sections are processed one at a time, each collaborator call awaited
/// before the next starts, so backups and log entries are taken in a
/// predictable order. A failing section is reported and skipped.
pub struct Orchestrator<'a> {
    config: &'a PipelineConfig,
    tracker: StatusTracker,
    log: ChangeLog,
    collaborators: Collaborators,
    phase: PipelinePhase,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        tracker: StatusTracker,
        log: ChangeLog,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            tracker,
            log,
            collaborators,
            phase: PipelinePhase::Idle,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn into_parts(self) -> (StatusTracker, ChangeLog) {
        (self.tracker, self.log)
    }

    /// Run every stage once, in pipeline order.
    pub async fn run_cycle(&mut self) -> Result<Vec<StageReport>, WorkflowError> {
        let mut reports = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            reports.push(self.run_stage(stage).await?);
        }
        info!("Pipeline cycle finished");
        Ok(reports)
    }

    /// Run one stage over all sections pending for it.
    pub async fn run_stage(&mut self, stage: Stage) -> Result<StageReport, WorkflowError> {
        let sections = self.tracker.pending_sections(stage);
        info!("Running {} for {} sections", stage, sections.len());

        self.phase = stage.into();
        let result = match stage {
            Stage::Analyze => Ok(self.analyze(&sections).await),
            Stage::Improve => Ok(self.improve(&sections).await),
            Stage::Review => Ok(self.review(&sections).await),
            Stage::Implement => self.implement(&sections),
        };
        self.phase = PipelinePhase::Idle;

        let report = result?;
        info!(
            "{} finished: {} processed, {} failed",
            stage,
            report.processed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn analyze(&mut self, sections: &[String]) -> StageReport {
        let mut report = StageReport::new(Stage::Analyze);
        for section in sections {
            let analysis = match self.collaborators.analyzer.analyze(section).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    report.fail(section, format!("analyzer: {e:#}"));
                    continue;
                }
            };
            if let Err(e) = write_json_atomic(&analysis, &self.analysis_path(section)) {
                report.fail(section, e.to_string());
                continue;
            }
            self.complete(&mut report, section, Stage::Analyze);
        }
        report
    }

    async fn improve(&mut self, sections: &[String]) -> StageReport {
        let mut report = StageReport::new(Stage::Improve);
        for section in sections {
            let analysis: Option<SectionAnalysis> = read_review_file(&self.analysis_path(section));
            let proposals = match self
                .collaborators
                .improver
                .improve(section, analysis.as_ref())
                .await
            {
                Ok(proposals) => proposals,
                Err(e) => {
                    report.fail(section, format!("improver: {e:#}"));
                    continue;
                }
            };
            if let Err(e) = write_json_atomic(&proposals, &self.proposals_path(section)) {
                report.fail(section, e.to_string());
                continue;
            }
            debug!("Stored {} proposals for '{}'", proposals.len(), section);
            self.complete(&mut report, section, Stage::Improve);
        }
        report
    }

    async fn review(&mut self, sections: &[String]) -> StageReport {
        let mut report = StageReport::new(Stage::Review);
        for section in sections {
            let Some(proposals) =
                read_review_file::<Vec<ProposedChange>>(&self.proposals_path(section))
            else {
                report.fail(section, "no stored proposals to review");
                continue;
            };
            let outcome = match self.collaborators.reviewer.review(section, &proposals).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.fail(section, format!("review: {e:#}"));
                    continue;
                }
            };

            if self.tracker.accepts(outcome.decision) {
                let approved: Vec<ApprovedChange> = outcome
                    .approved
                    .into_iter()
                    .map(|change| ApprovedChange {
                        section: Some(section.clone()),
                        ..change
                    })
                    .collect();
                if let Err(e) = self.append_approved(approved) {
                    report.fail(section, e.to_string());
                    continue;
                }
            } else if !outcome.approved.is_empty() {
                debug!(
                    "Discarding {} approvals for '{}' after a {} review",
                    outcome.approved.len(),
                    section,
                    outcome.decision
                );
            }

            match self
                .tracker
                .complete_stage(section, Stage::Review, Some(outcome.decision))
            {
                Ok(_) => report.processed.push(section.clone()),
                Err(e) => report.fail(section, e.to_string()),
            }
        }
        report
    }

    fn implement(&mut self, sections: &[String]) -> Result<StageReport, WorkflowError> {
        let mut report = StageReport::new(Stage::Implement);
        if sections.is_empty() {
            return Ok(report);
        }

        let path = self.config.approved_changes_path();
        let changes = match load_approved_changes(&path) {
            Ok(changes) => changes,
            Err(ApprovedChangesError::Missing(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let consumed = changes.len();

        let outcome = implement_changes(self.config, &mut self.log, changes, sections);
        if outcome.remaining.len() != consumed {
            save_approved_changes(&path, &outcome.remaining)?;
        }

        report.failed = outcome.failed;
        for section in &outcome.completed {
            self.complete(&mut report, section, Stage::Implement);
        }
        report.batch = Some(outcome.batch);
        Ok(report)
    }

    fn complete(&mut self, report: &mut StageReport, section: &str, stage: Stage) {
        match self.tracker.complete_stage(section, stage, None) {
            Ok(_) => report.processed.push(section.to_string()),
            Err(e) => report.fail(section, e.to_string()),
        }
    }

    fn append_approved(&self, approved: Vec<ApprovedChange>) -> Result<(), ApprovedChangesError> {
        if approved.is_empty() {
            return Ok(());
        }
        let path = self.config.approved_changes_path();
        let mut changes = match load_approved_changes(&path) {
            Ok(changes) => changes,
            Err(ApprovedChangesError::Missing(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        changes.extend(approved);
        save_approved_changes(&path, &changes)
    }

    fn analysis_path(&self, section: &str) -> PathBuf {
        self.config
            .review_dir()
            .join("analysis")
            .join(format!("{section}.json"))
    }

    fn proposals_path(&self, section: &str) -> PathBuf {
        self.config
            .review_dir()
            .join("proposals")
            .join(format!("{section}.json"))
    }
}

/// Read a stored review-cycle file; unreadable files count as absent.
fn read_review_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupManager;
    use crate::status::{NextAction, ReviewDecision};
    use crate::workflow::ReviewOutcome;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct MockAnalyzer {
        failing: HashSet<String>,
    }

    #[async_trait]
    impl SectionAnalyzer for MockAnalyzer {
        async fn analyze(&self, section: &str) -> anyhow::Result<SectionAnalysis> {
            if self.failing.contains(section) {
                anyhow::bail!("model timed out");
            }
            Ok(SectionAnalysis {
                section: section.to_string(),
                summary: format!("{section} reads like a brochure"),
                findings: vec!["too formal".into()],
                score: Some(0.4),
            })
        }
    }

    /// Proposes an uppercase title for `<section>.json`.
    struct MockImprover;

    #[async_trait]
    impl SectionImprover for MockImprover {
        async fn improve(
            &self,
            section: &str,
            analysis: Option<&SectionAnalysis>,
        ) -> anyhow::Result<Vec<ProposedChange>> {
            anyhow::ensure!(analysis.is_some(), "no analysis for {section}");
            Ok(vec![ProposedChange {
                file: format!("{section}.json"),
                field: "title".into(),
                original: format!("{section} title"),
                improved: format!("{} TITLE", section.to_uppercase()),
                rationale: None,
            }])
        }
    }

    struct MockReviewer {
        decision: ReviewDecision,
    }

    #[async_trait]
    impl ReviewSurface for MockReviewer {
        async fn review(
            &self,
            section: &str,
            proposals: &[ProposedChange],
        ) -> anyhow::Result<ReviewOutcome> {
            Ok(ReviewOutcome {
                decision: self.decision,
                approved: proposals.iter().map(|p| p.approve(section)).collect(),
            })
        }
    }

    fn setup(
        sections: &[&str],
        failing: &[&str],
        decision: ReviewDecision,
    ) -> (TempDir, PipelineConfig, Collaborators) {
        let dir = TempDir::new().unwrap();
        let mut config = PipelineConfig::defaults(dir.path());
        config.sections = sections.iter().map(|s| s.to_string()).collect();
        std::fs::create_dir_all(config.content_path("")).unwrap();
        for section in sections {
            std::fs::write(
                config.content_path(&format!("{section}.json")),
                format!("{{\"title\": \"{section} title\"}}"),
            )
            .unwrap();
        }
        let collaborators = Collaborators {
            analyzer: Box::new(MockAnalyzer {
                failing: failing.iter().map(|s| s.to_string()).collect(),
            }),
            improver: Box::new(MockImprover),
            reviewer: Box::new(MockReviewer { decision }),
        };
        (dir, config, collaborators)
    }

    fn orchestrator(config: &PipelineConfig, collaborators: Collaborators) -> Orchestrator<'_> {
        let tracker = StatusTracker::open(config).unwrap();
        let log = ChangeLog::open(config).unwrap();
        Orchestrator::new(config, tracker, log, collaborators)
    }

    fn title(config: &PipelineConfig, section: &str) -> String {
        let raw = std::fs::read_to_string(config.content_path(&format!("{section}.json"))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["title"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_full_cycle_implements_every_section() {
        let (_dir, config, collaborators) = setup(&["hero", "faq"], &[], ReviewDecision::Approved);
        let mut orch = orchestrator(&config, collaborators);

        let reports = orch.run_cycle().await.unwrap();

        assert_eq!(reports.len(), 4);
        for report in &reports {
            assert_eq!(report.processed.len(), 2, "stage {}", report.stage);
            assert!(report.failed.is_empty());
        }
        assert_eq!(orch.phase(), PipelinePhase::Idle);
        assert_eq!(orch.tracker().next_action(), NextAction::Complete);
        assert_eq!(title(&config, "hero"), "HERO TITLE");
        assert_eq!(orch.log().entries().len(), 2);
        assert_eq!(BackupManager::new(&config).list().unwrap().len(), 2);
        // Consumed approvals are removed from the review file
        assert!(load_approved_changes(&config.approved_changes_path())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failing_section_does_not_stop_the_rest() {
        let (_dir, config, collaborators) =
            setup(&["hero", "faq"], &["faq"], ReviewDecision::Approved);
        let mut orch = orchestrator(&config, collaborators);

        let report = orch.run_stage(Stage::Analyze).await.unwrap();

        assert_eq!(report.processed, vec!["hero"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].section, "faq");
        assert!(report.failed[0].reason.contains("model timed out"));
        assert_eq!(orch.tracker().pending_sections(Stage::Analyze), vec!["faq"]);
        assert!(config.review_dir().join("analysis/hero.json").exists());
    }

    #[tokio::test]
    async fn test_rejected_review_writes_nothing() {
        let (_dir, config, collaborators) = setup(&["hero"], &[], ReviewDecision::Rejected);
        let mut orch = orchestrator(&config, collaborators);

        let reports = orch.run_cycle().await.unwrap();

        assert_eq!(reports[2].processed, vec!["hero"]);
        assert!(reports[3].processed.is_empty());
        assert!(!config.approved_changes_path().exists());
        assert_eq!(title(&config, "hero"), "hero title");
        let record = orch.tracker().section("hero").unwrap();
        assert!(!record.reviewed);
        assert!(record.awaiting_rework);
    }

    #[tokio::test]
    async fn test_unresolvable_change_keeps_section_pending() {
        let (_dir, config, collaborators) = setup(&["hero"], &[], ReviewDecision::Approved);
        // Content no longer has the field the improver targets
        std::fs::write(config.content_path("hero.json"), r#"{"headline": "x"}"#).unwrap();
        let mut orch = orchestrator(&config, collaborators);

        let reports = orch.run_cycle().await.unwrap();

        let implement = &reports[3];
        assert!(implement.processed.is_empty());
        assert_eq!(implement.failed.len(), 1);
        assert_eq!(orch.tracker().pending_sections(Stage::Implement), vec!["hero"]);
        // The failed approval stays queued for a retry
        assert_eq!(
            load_approved_changes(&config.approved_changes_path())
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_review_without_proposals_fails_section() {
        let (_dir, config, collaborators) = setup(&["hero"], &[], ReviewDecision::Approved);
        let mut orch = orchestrator(&config, collaborators);
        orch.run_stage(Stage::Analyze).await.unwrap();
        orch.run_stage(Stage::Improve).await.unwrap();
        std::fs::remove_file(config.review_dir().join("proposals/hero.json")).unwrap();

        let report = orch.run_stage(Stage::Review).await.unwrap();

        assert!(report.processed.is_empty());
        assert_eq!(report.failed.len(), 1);
    }
}
