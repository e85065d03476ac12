//! Pipeline Event Log
//!
//! Append-only events for every meaningful transition. The machine's own
//! decisions derive from its state; the log exists for observers (tests,
//! tracing, diagnostics) to reconstruct a run.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    PipelineStart { total_stages: u32 },
    StageStart { stage: u32, attempt: u32 },
    StageSuccess { stage: u32, output: String },
    StageRetryRequest { from_stage: u32, target: u32 },
    StageFailure { stage: u32, message: String },
    PipelineComplete { output: String },
    PipelineAbort { reason: String },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::PipelineComplete { .. } | PipelineEvent::PipelineAbort { .. }
        )
    }
}
