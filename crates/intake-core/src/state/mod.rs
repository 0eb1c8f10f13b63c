//! State management for intake sessions.
//!
//! This module provides the state machine implementation for managing
//! workflow step transitions and session persistence, ensuring valid state
//! changes and maintaining data consistency.

pub mod session;

pub use session::{SessionStateError, WorkflowStateMachine};
