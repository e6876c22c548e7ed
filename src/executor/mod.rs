//! Action contracts and the single-attempt execution engine.

pub mod action;
pub mod executor;

pub use action::{
    ActionCtx, ActionKind, ActionRegistry, ProgressSink, SingleShotAction, StreamingAction,
};
pub use executor::{ActionExecutor, ExecutionReport};
