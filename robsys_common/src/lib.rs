//! Robot System Common Library
//!
//! Shared definitions for the robot control core and its clients.
//!
//! # Module Structure
//!
//! - [`protocol`] - Wire protocol constants, opcodes and status codes
//! - [`robot`] - Robot capability traits, DOF variables and handles
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use robsys_common::prelude::*;
//!
//! assert_eq!(Opcode::from_u8(0x02), Some(Opcode::Enable));
//! ```

pub mod config;
pub mod prelude;
pub mod protocol;
pub mod robot;
