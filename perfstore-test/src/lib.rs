//! Test utilities for the perfstore engine and server.
//!
//! See the modules for all available utilities.

pub mod backend;
pub mod tracing;
