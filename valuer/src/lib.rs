//! Valuer decides how many points a submission's output is worth.

pub mod answer_key;
pub mod scorer;
pub mod value;

pub use answer_key::{AnswerKey, Credit, MatchType, Points};
pub use scorer::Scorer;
pub use value::Value;
