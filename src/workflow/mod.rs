//! Workflow orchestration: persisted state, per-workspace locking and the
//! stage state machine.

pub mod locks;
pub mod machine;
pub mod store;

pub use machine::{Collaborators, MachineOptions, StageStateMachine, MAX_RFQ_RESPONSE_DAYS};
pub use store::{MemoryStateStore, PgStateStore, WorkflowStateStore};
