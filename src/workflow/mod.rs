pub mod action_ctx;
pub mod action_flow;

pub use action_ctx::ActionCtx;
pub use action_flow::{ActionError, ActionFlow, ActionKind, ActionOutcome, DocumentResult};
