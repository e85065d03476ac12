//! Pipeline State Machine
//!
//! A pure, event-sourced transducer: feed it `StageResult`s, get back the
//! next `Action`. No I/O happens here — the executor owns stage execution,
//! so tests can drive the machine synthetically.
//!
//! Stage numbering: stage 0 is the (implicit) source; user stages run 1..=n.
//! Stage 0 re-executes only when a retry targets it, and only when the
//! pipeline was created from a re-invocable source.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::pipeline::context::StageContext;
use crate::pipeline::events::PipelineEvent;

/// One retry context: at most one is active per pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub id: String,
    pub requesting_stage: u32,
    pub retrying_stage: u32,
    /// Number of retry requests in this context so far.
    pub attempt_number: u32,
    /// Outputs of the retrying stage's attempts within this context.
    pub all_attempts: Vec<String>,
    pub hints: Vec<JsonValue>,
    pub last_hint: Option<JsonValue>,
}

/// Result of executing one stage, reported by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    Success { output: String },
    Retry { from: Option<u32>, hint: Option<JsonValue> },
    Error { message: String },
}

/// The machine's instruction to the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ExecuteStage { stage: u32, input: String },
    Complete { output: String },
    Abort { reason: String },
    Fail { stage: u32, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatus {
    Idle,
    Running,
    Retrying,
    Completed,
    Failed,
}

/// A single context allows at most this many retry requests.
pub const MAX_CONTEXT_ATTEMPTS: u32 = 10;
/// A single stage may be targeted by at most this many retries per run.
pub const MAX_GLOBAL_STAGE_RETRIES: u32 = 20;

pub struct PipelineMachine {
    status: MachineStatus,
    user_stages: u32,
    source_retryable: bool,
    current_stage: u32,
    /// Latest successful output per stage; 0 holds the base input.
    outputs: HashMap<u32, String>,
    execution_counts: HashMap<u32, u32>,
    active_retry_context: Option<RetryContext>,
    global_stage_retry_count: HashMap<u32, u32>,
    all_retry_history: HashMap<String, Vec<String>>,
    events: Vec<PipelineEvent>,
    next_context_serial: u32,
}

impl PipelineMachine {
    pub fn new(user_stages: u32, source_retryable: bool) -> Self {
        Self {
            status: MachineStatus::Idle,
            user_stages,
            source_retryable,
            current_stage: 0,
            outputs: HashMap::new(),
            execution_counts: HashMap::new(),
            active_retry_context: None,
            global_stage_retry_count: HashMap::new(),
            all_retry_history: HashMap::new(),
            events: Vec::new(),
            next_context_serial: 0,
        }
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn current_stage(&self) -> u32 {
        self.current_stage
    }

    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    pub fn active_context(&self) -> Option<&RetryContext> {
        self.active_retry_context.as_ref()
    }

    pub fn all_retry_history(&self) -> &HashMap<String, Vec<String>> {
        &self.all_retry_history
    }

    pub fn start(&mut self, base_input: String) -> Action {
        self.status = MachineStatus::Running;
        self.outputs.insert(0, base_input.clone());
        self.events.push(PipelineEvent::PipelineStart {
            total_stages: self.user_stages,
        });
        if self.user_stages == 0 {
            return self.complete(base_input);
        }
        self.begin_stage(1, base_input)
    }

    /// Per-invocation context for the stage the machine just scheduled.
    pub fn stage_context(&self, stage: u32) -> StageContext {
        let in_cycle = self
            .active_retry_context
            .as_ref()
            .filter(|c| stage == c.requesting_stage || stage == c.retrying_stage);
        let history = self
            .active_retry_context
            .as_ref()
            .filter(|c| stage == c.retrying_stage)
            .map(|c| c.all_attempts.clone())
            .unwrap_or_default();
        StageContext {
            stage,
            attempt: self.execution_counts.get(&stage).copied().unwrap_or(1),
            context_attempt: in_cycle.map(|c| c.attempt_number + 1).unwrap_or(1),
            history,
            previous_outputs: self
                .outputs
                .iter()
                .filter(|(k, _)| **k < stage)
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            outputs: self.outputs.clone(),
            context_id: in_cycle.map(|c| c.id.clone()),
            hint: in_cycle.and_then(|c| c.last_hint.clone()),
            hints: in_cycle.map(|c| c.hints.clone()).unwrap_or_default(),
            total_stages: self.user_stages,
        }
    }

    pub fn on_stage_result(&mut self, stage: u32, result: StageResult) -> Action {
        match result {
            StageResult::Success { output } => self.on_success(stage, output),
            StageResult::Retry { from, hint } => self.on_retry_request(stage, from, hint),
            StageResult::Error { message } => {
                self.events.push(PipelineEvent::StageFailure {
                    stage,
                    message: message.clone(),
                });
                self.status = MachineStatus::Failed;
                Action::Fail { stage, message }
            }
        }
    }

    fn on_success(&mut self, stage: u32, output: String) -> Action {
        self.events.push(PipelineEvent::StageSuccess {
            stage,
            output: output.clone(),
        });
        self.outputs.insert(stage, output.clone());

        // An empty string from any stage terminates the whole pipeline.
        if output.is_empty() && stage != 0 {
            return self.complete(String::new());
        }

        enum CyclePosition {
            Retrying { requesting: u32 },
            Requesting,
            Outside,
        }
        let position = match &self.active_retry_context {
            Some(c) if stage == c.retrying_stage => CyclePosition::Retrying {
                requesting: c.requesting_stage,
            },
            Some(c) if stage == c.requesting_stage => CyclePosition::Requesting,
            _ => CyclePosition::Outside,
        };
        match position {
            CyclePosition::Retrying { requesting } => {
                if let Some(context) = self.active_retry_context.as_mut() {
                    context.all_attempts.push(output.clone());
                }
                // Replay the requesting stage with the retry's output.
                self.events.push(PipelineEvent::StageRetryRequest {
                    from_stage: requesting,
                    target: requesting,
                });
                return self.begin_stage(requesting, output);
            }
            CyclePosition::Requesting => {
                // Clearance: the requesting stage finally succeeded.
                if let Some(context) = self.active_retry_context.take() {
                    self.all_retry_history
                        .insert(context.id, context.all_attempts);
                }
                self.status = MachineStatus::Running;
            }
            CyclePosition::Outside => {}
        }

        if stage >= self.user_stages {
            return self.complete(output);
        }
        self.begin_stage(stage + 1, output)
    }

    fn on_retry_request(&mut self, stage: u32, from: Option<u32>, hint: Option<JsonValue>) -> Action {
        let target = from.unwrap_or_else(|| stage.saturating_sub(1));
        self.events.push(PipelineEvent::StageRetryRequest {
            from_stage: stage,
            target,
        });

        // Self-retry rules. Requests from stage 0 only reach the machine
        // when a driver feeds it results directly; `run_pipeline` reports
        // source outcomes as success or error, never as retries.
        if stage == target && target != 0 {
            return self.abort(format!("stage {} cannot retry itself", stage));
        }
        if stage == target && target == 0 && self.user_stages != 1 {
            return self.abort("stage 0 cannot self-retry in a multi-stage pipeline".to_string());
        }
        // Stage 0 retryability
        if target == 0 && !self.source_retryable {
            return self.abort("stage 0 is not retryable: the pipeline source is not a function".to_string());
        }

        // Global per-stage cap, checked before counting this request
        let global = self.global_stage_retry_count.get(&target).copied().unwrap_or(0);
        if global >= MAX_GLOBAL_STAGE_RETRIES {
            return self.abort(format!(
                "stage {} exceeded global retry limit ({})",
                target, MAX_GLOBAL_STAGE_RETRIES
            ));
        }

        // Context reuse: the same (requesting, retrying) pair continues its
        // context; anything else archives the old one and starts fresh.
        let reuse = self
            .active_retry_context
            .as_ref()
            .map(|c| c.requesting_stage == stage && c.retrying_stage == target)
            .unwrap_or(false);
        if reuse {
            let context = self
                .active_retry_context
                .as_mut()
                .unwrap_or_else(|| unreachable!("reuse implies an active context"));
            context.attempt_number += 1;
            if let Some(h) = &hint {
                context.hints.push(h.clone());
            }
            context.last_hint = hint;
        } else {
            if let Some(previous) = self.active_retry_context.take() {
                self.all_retry_history
                    .insert(previous.id, previous.all_attempts);
            }
            self.next_context_serial += 1;
            let id = format!(
                "ctx-{}-{:08x}",
                self.next_context_serial,
                rand::random::<u32>()
            );
            self.active_retry_context = Some(RetryContext {
                id,
                requesting_stage: stage,
                retrying_stage: target,
                attempt_number: 1,
                all_attempts: Vec::new(),
                hints: hint.iter().cloned().collect(),
                last_hint: hint,
            });
        }

        // Per-context cap: request number 11 aborts.
        let attempt_number = self
            .active_retry_context
            .as_ref()
            .map(|c| c.attempt_number)
            .unwrap_or(1);
        if attempt_number > MAX_CONTEXT_ATTEMPTS {
            return self.abort(format!(
                "stage {} exceeded retry limit ({} attempts per context)",
                stage, MAX_CONTEXT_ATTEMPTS
            ));
        }

        *self.global_stage_retry_count.entry(target).or_insert(0) += 1;
        self.status = MachineStatus::Retrying;

        let input = if target == 0 {
            // The executor re-invokes the source; input is informational.
            self.outputs.get(&0).cloned().unwrap_or_default()
        } else {
            self.outputs.get(&(target - 1)).cloned().unwrap_or_default()
        };
        self.begin_stage(target, input)
    }

    fn begin_stage(&mut self, stage: u32, input: String) -> Action {
        self.current_stage = stage;
        let count = self.execution_counts.entry(stage).or_insert(0);
        *count += 1;
        self.events.push(PipelineEvent::StageStart {
            stage,
            attempt: *count,
        });
        Action::ExecuteStage { stage, input }
    }

    fn complete(&mut self, output: String) -> Action {
        self.status = MachineStatus::Completed;
        self.events.push(PipelineEvent::PipelineComplete {
            output: output.clone(),
        });
        Action::Complete { output }
    }

    fn abort(&mut self, reason: String) -> Action {
        self.status = MachineStatus::Failed;
        self.events
            .push(PipelineEvent::PipelineAbort { reason: reason.clone() });
        Action::Abort { reason }
    }
}
