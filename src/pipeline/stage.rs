use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Invocable pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Clean,
    Dedup,
    Fuse,
    Snapshot,
    Aggregate,
    Detect,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Clean,
        Stage::Dedup,
        Stage::Fuse,
        Stage::Snapshot,
        Stage::Aggregate,
        Stage::Detect,
        Stage::Report,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::Dedup => "dedup",
            Stage::Fuse => "fuse",
            Stage::Snapshot => "snapshot",
            Stage::Aggregate => "aggregate",
            Stage::Detect => "detect",
            Stage::Report => "report",
        }
    }

    /// Stages whose output this stage reads.
    pub fn prerequisites(&self) -> &'static [Stage] {
        match self {
            Stage::Clean => &[],
            Stage::Dedup => &[Stage::Clean],
            Stage::Fuse => &[Stage::Dedup],
            Stage::Snapshot | Stage::Aggregate | Stage::Detect => &[Stage::Fuse],
            Stage::Report => &[Stage::Aggregate, Stage::Detect],
        }
    }

    /// Every stage this one depends on, directly or not.
    pub fn upstream(&self) -> Vec<Stage> {
        let mut found = Vec::new();
        let mut pending: Vec<Stage> = self.prerequisites().to_vec();
        while let Some(stage) = pending.pop() {
            if !found.contains(&stage) {
                found.push(stage);
                pending.extend_from_slice(stage.prerequisites());
            }
        }
        found
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s.trim().to_lowercase())
            .ok_or_else(|| PipelineError::Config(format!("unknown stage '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Loaded,
    Cleaned,
    Deduped,
    Fused,
    Aggregated,
    AnomalyDetected,
    Reported,
    Failed,
}

/// Tracks which stages completed in this run and enforces that a stage only
/// starts once everything it reads has been produced.
#[derive(Debug, Clone)]
pub struct Progress {
    state: PipelineState,
    completed: Vec<Stage>,
}

impl Default for Progress {
    fn default() -> Self {
        Progress {
            state: PipelineState::Loaded,
            completed: Vec::new(),
        }
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress for a single-stage run: upstream stages are assumed to have
    /// left their relations in the store.
    pub fn resume_before(stage: Stage) -> Self {
        let mut progress = Self::new();
        let mut upstream = stage.upstream();
        upstream.sort_by_key(|s| Stage::ALL.iter().position(|x| x == s));
        for done in upstream {
            progress.completed.push(done);
            progress.state = reached_state(progress.state, done);
        }
        progress
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    pub fn begin(&self, stage: Stage) -> Result<()> {
        if self.state == PipelineState::Failed {
            return Err(PipelineError::InvalidState(format!(
                "cannot run '{}' after a failed stage",
                stage
            )));
        }
        if let Some(missing) = stage.prerequisites().iter().find(|p| !self.is_done(**p)) {
            return Err(PipelineError::InvalidState(format!(
                "stage '{}' requires '{}' to complete first (state: {:?})",
                stage, missing, self.state
            )));
        }
        Ok(())
    }

    pub fn complete(&mut self, stage: Stage) {
        if !self.is_done(stage) {
            self.completed.push(stage);
        }
        self.state = reached_state(self.state, stage);
    }

    pub fn fail(&mut self) {
        self.state = PipelineState::Failed;
    }
}

fn reached_state(current: PipelineState, stage: Stage) -> PipelineState {
    match stage {
        Stage::Clean => PipelineState::Cleaned,
        Stage::Dedup => PipelineState::Deduped,
        Stage::Fuse => PipelineState::Fused,
        Stage::Snapshot => current,
        Stage::Aggregate => PipelineState::Aggregated,
        Stage::Detect => PipelineState::AnomalyDetected,
        Stage::Report => PipelineState::Reported,
    }
}
