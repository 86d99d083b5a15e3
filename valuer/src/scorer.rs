use crate::{answer_key::AnswerKey, value::Value};
use grader_apis::GradeResult;
use std::{collections::BTreeMap, sync::Arc};

/// Error category for output that is not a JSON object
pub const PARSING: &str = "parsing";
/// Error category for a missing or unusable answer key
pub const ANSWER_KEY: &str = "answer_key";

/// Turns raw submission output into a [`GradeResult`].
///
/// Scoring problems (as opposed to wrong answers) are collected in
/// [`errors`](Scorer::errors); a scorer with errors is not successful and
/// its result should not be recorded.
pub struct Scorer {
    key: Option<Arc<AnswerKey>>,
    errors: BTreeMap<String, String>,
}

impl Scorer {
    pub fn new(key: Arc<AnswerKey>) -> Scorer {
        Scorer {
            key: Some(key),
            errors: BTreeMap::new(),
        }
    }

    /// Scorer that can not grade anything because the key failed to load.
    pub fn without_key(reason: impl Into<String>) -> Scorer {
        let mut errors = BTreeMap::new();
        errors.insert(ANSWER_KEY.to_string(), reason.into());
        Scorer { key: None, errors }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable `category: message` lines
    pub fn describe_errors(&self) -> String {
        self.errors
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn grade(&mut self, raw_output: &str) -> GradeResult {
        let mut results = GradeResult::default();
        if raw_output.trim().is_empty() {
            return results;
        }
        let key = match &self.key {
            Some(k) => k.clone(),
            None => return results,
        };

        // submission may print other things before its answers
        let trimmed = raw_output.strip_suffix('\n').unwrap_or(raw_output);
        let last_line = trimmed.rsplit('\n').next().unwrap_or(trimmed);
        let last_line = last_line.trim_end_matches('\r');

        let answers = match serde_json::from_str::<Value>(last_line) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                self.errors.insert(
                    PARSING.to_string(),
                    format!(
                        "expected a JSON object on the last output line, got {}",
                        crate::value::kind(&other)
                    ),
                );
                return results;
            }
            Err(err) => {
                self.errors.insert(PARSING.to_string(), err.to_string());
                return results;
            }
        };

        for question in key.keys() {
            let submitted = match answers.get(question) {
                Some(v) => v,
                None => {
                    results.wrong.insert(question, "Unanswered");
                    continue;
                }
            };
            let credit = key.process(question, submitted);
            let points = credit.points.unwrap_or(0.0);
            if credit.is_full() {
                results.points += points;
                continue;
            }
            if credit.partial && points > 0.0 {
                results.points += points;
            }
            results
                .wrong
                .insert(question, format!("Submitted value was '{}'", submitted));
        }
        results.total_points = key.total_points();
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scorer() -> Scorer {
        let key = json!({
            "question 1": {"expected": "Ale", "points": 1},
            "question 2": {"expected": 60.0, "points": 2},
            "question 3": {
                "expected": {"full": "Sword", "partial": "Shield"},
                "points": {"full": 4, "partial": 1}
            }
        });
        Scorer::new(Arc::new(AnswerKey::from_json(&key.to_string()).unwrap()))
    }

    #[test]
    fn all_correct() {
        let mut s = scorer();
        let out = "booting...\n{\"question 1\": \"Ale\", \"question 2\": 60, \"question 3\": \"Sword\"}\n";
        let r = s.grade(out);
        assert!(s.success());
        assert_eq!(r.points, 7.0);
        assert_eq!(r.total_points, 7.0);
        assert!(r.wrong.is_empty());
        assert_eq!(r.grade(), Some(1.0));
    }

    #[test]
    fn empty_output_grades_nothing() {
        let mut s = scorer();
        let r = s.grade("");
        assert!(s.success());
        assert_eq!(r, GradeResult::default());
        assert_eq!(s.grade("  \n").total_points, 0.0);
    }

    #[test]
    fn unanswered_question_still_counts_towards_total() {
        let mut s = scorer();
        let r = s.grade(r#"{"question 1": "Ale", "question 2": 60.0}"#);
        assert_eq!(r.points, 3.0);
        assert_eq!(r.total_points, 7.0);
        assert_eq!(r.wrong.get("question 3"), Some("Unanswered"));
        assert_eq!(r.wrong.len(), 1);
    }

    #[test]
    fn partial_credit_is_awarded_but_reported() {
        let mut s = scorer();
        let r = s.grade(r#"{"question 1": "Bow", "question 2": 60, "question 3": "Shield"}"#);
        assert_eq!(r.points, 3.0);
        assert_eq!(r.wrong.get("question 1"), Some("Submitted value was '\"Bow\"'"));
        assert_eq!(
            r.wrong.get("question 3"),
            Some("Submitted value was '\"Shield\"'")
        );
        let order: Vec<_> = r.wrong.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["question 1", "question 3"]);
    }

    #[test]
    fn only_last_line_is_graded() {
        let mut s = scorer();
        let r = s.grade("{\"question 1\": \"Ale\"}\r\nnot json\r\n");
        assert!(!s.success());
        assert!(s.errors().contains_key(PARSING));
        assert_eq!(r.points, 0.0);
    }

    #[test]
    fn non_object_output_is_a_parsing_error() {
        let mut s = scorer();
        s.grade("[1, 2, 3]");
        assert!(s.describe_errors().starts_with("parsing: expected a JSON object"));
    }

    #[test]
    fn missing_key_reports_prerequisite_error() {
        let mut s = Scorer::without_key("could not locate answer key");
        let r = s.grade(r#"{"question 1": "Ale"}"#);
        assert!(!s.success());
        assert_eq!(
            s.errors().get(ANSWER_KEY).map(String::as_str),
            Some("could not locate answer key")
        );
        assert_eq!(r, GradeResult::default());
    }
}
