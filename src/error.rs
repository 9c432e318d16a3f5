//! Typed errors for the fatal run preconditions.
//!
//! Only preconditions live here: a delegate invocation that exits nonzero is
//! per-target data carried in [`crate::builder::ArtifactResult`], never an
//! error.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for orchestrator preconditions.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Fatal errors that abort a run before any target is attempted.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The version source file is missing or unreadable.
    #[error("cannot read version source {}: {reason}", path.display())]
    VersionSourceUnreadable {
        /// Path to the version source file
        path: PathBuf,
        /// Underlying read failure
        reason: String,
    },

    /// The version source was readable but contained no version declaration.
    #[error("no `version = \"...\"` declaration found in {}", path.display())]
    VersionNotFound {
        /// Path to the version source file
        path: PathBuf,
    },

    /// The output directory could not be created or cleared.
    ///
    /// "Does not exist" and "cannot be listed" are distinct conditions; a
    /// listing or removal failure is reported here and never masked by a
    /// create attempt.
    #[error("output directory {}: {reason}", path.display())]
    OutputDirectory {
        /// Path to the output directory (or the entry that failed)
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A requested target is not in the catalog.
    #[error("unknown target '{spec}', expected a catalog entry (see `crossrel targets`)")]
    UnknownTarget {
        /// The os/arch spec as given on the command line
        spec: String,
    },

    /// A target was requested more than once.
    #[error("target '{spec}' selected more than once")]
    DuplicateTarget {
        /// The duplicated os/arch spec
        spec: String,
    },
}
