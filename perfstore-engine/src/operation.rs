//! Operation kinds, used as metric labels.

use std::fmt;

/// The kind of operation issued against a backend.
///
/// Used as the `op` label of all recorded metrics.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    /// Creation of a new key during the preset phase.
    Insert,
    /// Read of an existing key.
    Read,
    /// Overwrite of an existing key with a fresh payload.
    Update,
    /// Removal of a key. Only issued by [`cleanup`](crate::cleanup::cleanup).
    Delete,
}

impl Operation {
    /// All operations, in label order.
    pub const ALL: [Operation; 4] = [
        Operation::Insert,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];

    /// Returns the metrics label for this operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
