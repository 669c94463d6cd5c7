//! Candidate validation.
//!
//! The [`ValidatorAgent`] fetches a candidate, retries transient failures
//! within the attempt budget, parses the document and runs the
//! [`CheckRegistry`]. The result is a [`ValidationOutcome`] plus, on accept,
//! the parsed document and its claimed content hash.
//!
//! [`ValidationOutcome`]: feedscout_shared::ValidationOutcome

mod agent;
pub mod checks;

pub use agent::{Validation, ValidatorAgent};
pub use checks::{
    CheckContext, CheckFailure, CheckRegistry, DuplicateRegistry, QualityCheck, language_tag_for,
};
