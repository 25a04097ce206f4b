//! Storage backends the engine can drive load against.
//!
//! The engine only depends on the [`Backend`] trait. How workers obtain their client is decided
//! by [`Connections`]:
//!
//! | backend        | connections  |
//! |----------------|--------------|
//! | `memory`       | shared       |
//! | `filesystem`   | shared       |
//! | `s3compatible` | per worker   |

mod common;
mod in_memory;
mod local_fs;
mod s3_compatible;

pub use common::*;
pub use in_memory::InMemoryBackend;
pub use local_fs::LocalFsBackend;
pub use s3_compatible::{S3CompatibleBackend, S3CompatibleConfig};
