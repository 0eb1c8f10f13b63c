//! Core intake engine for the RadOrder order-management system.
//!
//! This module provides the order-intake state machine: it drives a session
//! through dictation, validation, and signature, enforcing minimum input,
//! tracking retry attempts, gating override eligibility, and budgeting trial
//! validation credits. External collaborators (validation gateway, submission
//! service, speech capability, credential resolution, session storage) are
//! injected behind service traits and wired by the builder.

pub mod builder;
pub mod engine;
pub mod event_bus;
pub mod state;

pub use builder::IntakeBuilder;
pub use engine::{EngineError, IntakeEngine};
pub use event_bus::EventBus;
pub use state::{SessionStateError, WorkflowStateMachine};
