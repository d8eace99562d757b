//! Domain models
//!
//! In-memory structures exchanged with the submission and contest collaborators.

pub mod contest;
pub mod language;
pub mod submission;
pub mod test_case;

pub use contest::*;
pub use language::*;
pub use submission::*;
pub use test_case::*;
