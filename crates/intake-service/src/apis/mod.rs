//! API handlers for the intake service.

pub mod session;
