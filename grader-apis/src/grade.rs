//! Grading results.
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt;

/// Questions that did not receive full credit, in evaluation order.
/// Serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WrongAnswers(Vec<(String, String)>);

impl WrongAnswers {
    pub fn new() -> Self {
        WrongAnswers(Vec::new())
    }

    /// Records a reason for `key`. Returns false (and keeps the old reason)
    /// if the key was already recorded.
    pub fn insert(&mut self, key: impl Into<String>, reason: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.0.push((key, reason.into()));
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, reason)| reason.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for WrongAnswers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WrongAnswers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WrongAnswersVisitor;

        impl<'de> Visitor<'de> for WrongAnswersVisitor {
            type Value = WrongAnswers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from question key to reason")
            }

            fn visit_map<A>(self, mut access: A) -> Result<WrongAnswers, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut wrong = WrongAnswers::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    wrong.insert(k, v);
                }
                Ok(wrong)
            }
        }

        deserializer.deserialize_map(WrongAnswersVisitor)
    }
}

/// Outcome of scoring one submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub points: f64,
    pub total_points: f64,
    pub wrong: WrongAnswers,
}

impl GradeResult {
    /// `points / total_points`; None if there was nothing to score.
    pub fn grade(&self) -> Option<f64> {
        if self.total_points == 0.0 {
            None
        } else {
            Some(self.points / self.total_points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_answers_keep_first_reason_and_order() {
        let mut wrong = WrongAnswers::new();
        assert!(wrong.insert("question 2", "Unanswered"));
        assert!(wrong.insert("question 1", "Submitted value was '\"Bow\"'"));
        assert!(!wrong.insert("question 2", "something else"));
        assert_eq!(wrong.len(), 2);
        assert_eq!(wrong.get("question 2"), Some("Unanswered"));
        let keys: Vec<_> = wrong.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["question 2", "question 1"]);
    }

    #[test]
    fn serializes_wrong_answers_as_ordered_object() {
        let mut result = GradeResult {
            points: 1.0,
            total_points: 4.0,
            ..Default::default()
        };
        result.wrong.insert("b", "Unanswered");
        result.wrong.insert("a", "Unanswered");
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"points":1.0,"totalPoints":4.0,"wrong":{"b":"Unanswered","a":"Unanswered"}}"#
        );
        let back: GradeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.grade(), Some(0.25));
    }

    #[test]
    fn grade_is_undefined_without_total() {
        assert_eq!(GradeResult::default().grade(), None);
    }
}
