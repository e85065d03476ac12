//! Pipeline subsystem: stage contexts, the append-only event log, the pure
//! state machine, builtin transformers, and the executor that drives them.

pub mod builtins;
pub mod context;
pub mod events;
pub mod executor;
pub mod state_machine;

pub use context::StageContext;
pub use events::PipelineEvent;
pub use executor::run_pipeline;
pub use state_machine::{
    Action, MachineStatus, PipelineMachine, RetryContext, StageResult, MAX_CONTEXT_ATTEMPTS,
    MAX_GLOBAL_STAGE_RETRIES,
};
