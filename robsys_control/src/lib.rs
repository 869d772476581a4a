//! # Robot System Control Core
//!
//! Cyclic control process owning one robot controller and serving three
//! channels every period:
//!
//! | Channel | Transport | Traffic |
//! |---------|-----------|---------|
//! | events | TCP | opcodes in, status + payload out |
//! | axes | UDP | setpoint batches in, measure batches out |
//! | joints | UDP | measure batches out |
//!
//! ## Cycle
//!
//! Events, then axes, then joints, then sleep for the rest of the period.
//! Everything runs on one thread; the [`session::Session`] is the only
//! owner of the controller and its handle lists.
//!
//! ## Modules
//!
//! - [`transport`] - Non-blocking channels (TCP, UDP, in-memory)
//! - [`codec`] - DOF batch encoding and decoding
//! - [`control`] - Opcode-driven control state machine
//! - [`session`] - Active controller, handle lists, descriptor, hot-swap
//! - [`registry`] - Robot kinds and name resolution
//! - [`robots`] - Built-in controllers
//! - [`datalog`] - `set-user` logging hook
//! - [`cycle`] - Scheduler, cycle statistics, RT setup
//! - [`fault`] - Fail-fast memory fault handler
//! - [`error`] - Startup errors

pub mod codec;
pub mod control;
pub mod cycle;
pub mod datalog;
pub mod error;
pub mod fault;
pub mod registry;
pub mod robots;
pub mod session;
pub mod transport;
