//! Synthetic load generator for storage backends.
//!
//! See [`perfstore_server::cli`] for the available commands.
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    perfstore_server::cli::execute()
}
