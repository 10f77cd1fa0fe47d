use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::types::{
    NextAction, ReviewDecision, SectionRecord, Stage, StatusEvent, StatusStats,
};
use super::StatusError;
use crate::config::{PartialPolicy, PipelineConfig, RejectionPolicy, ReviewPolicy};
use crate::document::write_json_atomic;

#[derive(Serialize)]
struct StatusFileRef<'a> {
    sections: &'a BTreeMap<String, SectionRecord>,
    stats: StatusStats,
    history: &'a [StatusEvent],
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StatusFile {
    sections: BTreeMap<String, SectionRecord>,
    history: Vec<StatusEvent>,
}

#[derive(Clone)]
struct StatusState {
    sections: BTreeMap<String, SectionRecord>,
    history: Vec<StatusEvent>,
}

/// Tracks which stages each section has completed.
///
/// Every mutation rewrites the whole status file atomically before the
/// in-memory table is updated, so the file always holds the last state that
/// was successfully recorded.
pub struct StatusTracker {
    path: PathBuf,
    policy: ReviewPolicy,
    state: StatusState,
}

impl StatusTracker {
    pub fn open(config: &PipelineConfig) -> Result<Self, StatusError> {
        Self::open_at(config.status_path(), &config.sections, config.policy)
    }

    /// Load the status file at `path`, adding any configured section it lacks.
    pub fn open_at(
        path: impl Into<PathBuf>,
        sections: &[String],
        policy: ReviewPolicy,
    ) -> Result<Self, StatusError> {
        let path = path.into();
        let mut file = load_status(&path)?;
        for name in sections {
            file.sections.entry(name.clone()).or_default();
        }

        Ok(Self {
            path,
            policy,
            state: StatusState {
                sections: file.sections,
                history: file.history,
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sections(&self) -> &BTreeMap<String, SectionRecord> {
        &self.state.sections
    }

    pub fn section(&self, name: &str) -> Option<&SectionRecord> {
        self.state.sections.get(name)
    }

    /// Audit trail, oldest first.
    pub fn history(&self) -> &[StatusEvent] {
        &self.state.history
    }

    /// Whether `record` is waiting for `stage` under the current policy.
    pub fn is_pending(&self, record: &SectionRecord, stage: Stage) -> bool {
        match stage {
            Stage::Analyze => !record.analyzed,
            Stage::Improve => {
                record.analyzed
                    && (!record.improved
                        || (record.awaiting_rework
                            && self.policy.rejected == RejectionPolicy::Reimprove))
            }
            Stage::Review => record.improved && !record.reviewed && !record.awaiting_rework,
            Stage::Implement => record.reviewed && !record.implemented,
        }
    }

    /// Sections eligible for `stage`, in name order.
    pub fn pending_sections(&self, stage: Stage) -> Vec<String> {
        self.state
            .sections
            .iter()
            .filter(|(_, record)| self.is_pending(record, stage))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The stage with the most pending sections.
    ///
    /// Ties go to the earlier stage; `Complete` when nothing is pending.
    pub fn next_action(&self) -> NextAction {
        let mut best: Option<(Stage, usize)> = None;
        for stage in Stage::ALL {
            let count = self.pending_sections(stage).len();
            if count > 0 && best.map_or(true, |(_, most)| count > most) {
                best = Some((stage, count));
            }
        }
        best.map_or(NextAction::Complete, |(stage, _)| stage.into())
    }

    /// Record that `section` completed `stage`.
    ///
    /// Review completions require a `decision`. An approval, or a partial
    /// approval under the `proceed` policy, marks the section reviewed. A
    /// rejection, or a partial approval under `rework`, only records the
    /// decision and sends the section back for another improve pass.
    pub fn complete_stage(
        &mut self,
        section: &str,
        stage: Stage,
        decision: Option<ReviewDecision>,
    ) -> Result<&SectionRecord, StatusError> {
        let record = self
            .state
            .sections
            .get(section)
            .ok_or_else(|| StatusError::UnknownSection(section.to_string()))?;

        if let Some(missing) = stage.prerequisite().filter(|p| !record.is_complete(*p)) {
            return Err(StatusError::PrerequisiteMissing {
                section: section.to_string(),
                stage,
                missing,
            });
        }

        let rework = stage == Stage::Improve && record.awaiting_rework;
        if record.is_complete(stage) && !rework {
            return Err(StatusError::AlreadyCompleted {
                section: section.to_string(),
                stage,
            });
        }

        let decision = match (stage, decision) {
            (Stage::Review, Some(decision)) => Some(decision),
            (Stage::Review, None) => {
                return Err(StatusError::DecisionRequired(section.to_string()))
            }
            (_, Some(_)) => return Err(StatusError::DecisionNotApplicable(stage)),
            (_, None) => None,
        };
        if stage == Stage::Review && record.awaiting_rework {
            return Err(StatusError::AwaitingRework(section.to_string()));
        }

        let now = Utc::now();
        let mut next = self.state.clone();
        let updated = next
            .sections
            .get_mut(section)
            .ok_or_else(|| StatusError::UnknownSection(section.to_string()))?;

        let action = match decision {
            Some(decision) => {
                updated.review_decision = Some(decision);
                updated.reviewed_at = Some(now);
                if self.accepts(decision) {
                    updated.mark_complete(Stage::Review, now);
                } else {
                    updated.awaiting_rework = true;
                }
                format!("{}:{}", stage.completed_action(), decision)
            }
            None => {
                updated.mark_complete(stage, now);
                stage.completed_action().to_string()
            }
        };
        next.history.push(StatusEvent {
            timestamp: now,
            section: section.to_string(),
            action: action.clone(),
        });

        self.commit(next)?;
        info!("Section '{}' {}", section, action);
        self.state
            .sections
            .get(section)
            .ok_or_else(|| StatusError::UnknownSection(section.to_string()))
    }

    /// Return every section to pending. Returns the number of sections reset.
    pub fn reset_all(&mut self) -> Result<usize, StatusError> {
        let now = Utc::now();
        let mut next = self.state.clone();
        for (name, record) in next.sections.iter_mut() {
            *record = SectionRecord::default();
            next.history.push(StatusEvent {
                timestamp: now,
                section: name.clone(),
                action: "reset".to_string(),
            });
        }

        let count = next.sections.len();
        self.commit(next)?;
        info!("Reset {} sections to pending", count);
        Ok(count)
    }

    pub fn summary(&self) -> StatusStats {
        summarize(&self.state.sections)
    }

    /// Whether `decision` marks a section reviewed under the current policy.
    pub fn accepts(&self, decision: ReviewDecision) -> bool {
        match decision {
            ReviewDecision::Approved => true,
            ReviewDecision::Rejected => false,
            ReviewDecision::Partial => self.policy.partial == PartialPolicy::Proceed,
        }
    }

    fn commit(&mut self, next: StatusState) -> Result<(), StatusError> {
        let file = StatusFileRef {
            sections: &next.sections,
            stats: summarize(&next.sections),
            history: &next.history,
        };
        write_json_atomic(&file, &self.path)?;
        debug!("Saved section status to {:?}", self.path);
        self.state = next;
        Ok(())
    }
}

fn summarize(sections: &BTreeMap<String, SectionRecord>) -> StatusStats {
    let mut stats = StatusStats {
        total: sections.len(),
        ..Default::default()
    };
    for record in sections.values() {
        stats.analyzed += usize::from(record.analyzed);
        stats.improved += usize::from(record.improved);
        stats.reviewed += usize::from(record.reviewed);
        stats.implemented += usize::from(record.implemented);
        stats.awaiting_rework += usize::from(record.awaiting_rework);
    }
    stats
}

fn load_status(path: &Path) -> Result<StatusFile, StatusError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No status file at {:?}, all sections pending", path);
            return Ok(StatusFile::default());
        }
        Err(e) => {
            return Err(StatusError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let file: StatusFile = serde_json::from_str(&content).map_err(|e| StatusError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    if let Some((name, _)) = file.sections.iter().find(|(_, record)| !record.is_monotonic()) {
        return Err(StatusError::Inconsistent {
            path: path.to_path_buf(),
            section: name.clone(),
        });
    }
    debug!("Loaded status for {} sections from {:?}", file.sections.len(), path);
    Ok(file)
}
