//! Subsystems outside the supervisor: the intake channels and their runtime.

pub mod comms;
pub mod runtime;
