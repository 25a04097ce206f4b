//! The perfstore process.
//!
//! This wraps the [`perfstore_engine`] with configuration, observability, a metrics endpoint and
//! signal handling, and exposes it as the `perfstore` command line tool.

pub mod cli;
pub mod config;
pub mod healthcheck;
pub mod observability;
pub mod report;
pub mod run;
pub mod state;
pub mod web;
