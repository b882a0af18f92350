use std::io;
use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

/// Fatal conditions that abort a single verification request.
///
/// Everything else (missing classes, invalid class files, structural problems) is data and
/// flows through [`crate::resolver::ResolutionResult`] or the registrar.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("IO error while opening {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while opening {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("unsupported class source: {path}")]
    UnsupportedSource { path: PathBuf },
    #[error("class file {path} cannot be indexed: {reason}")]
    UnreadableClass { path: PathBuf, reason: String },
    #[error("verification cancelled")]
    Cancelled,
    #[error("resolver answered inconsistently for {class_name}: {first} vs {second}")]
    IncoherentResolver {
        class_name: String,
        first: String,
        second: String,
    },
}
