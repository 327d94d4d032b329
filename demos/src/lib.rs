//! Example handlers for the invocation shell.
//!
//! Each handler lives in its own module and is served by a matching binary
//! under `src/bin/`.

pub mod calculator;
pub mod hello;

/// Re-export commonly used types from the shell
pub use invocation_shell::*;
