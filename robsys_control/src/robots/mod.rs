//! Built-in robot controllers.

pub mod simulation;
