//! Static binary compatibility verification of JVM plugins against a host platform.

pub mod cfg;
pub mod checks;
pub mod config;
pub mod dependencies;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod hierarchy;
pub mod interpreter;
pub mod ir;
pub mod opcodes;
pub mod resolver;
pub mod scan;
pub mod source;
pub mod usage;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use config::VerifierConfig;
pub use error::VerificationError;
pub use verifier::{CancellationToken, VerificationRequest, VerificationSummary, Verifier};
