//! Types shared between grader components.
pub mod config;
pub mod grade;
pub mod submission;
pub mod usage;

pub use config::{EvaluationType, PlatformConfig};
pub use grade::{GradeResult, WrongAnswers};
pub use submission::Submission;
pub use usage::UsageStat;
