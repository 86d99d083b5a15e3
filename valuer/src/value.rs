//! Helpers for comparing JSON values the way answers are graded.
pub use serde_json::Value;

/// Variant tag of a [`Value`]. Integers and floats share `Number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Kind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

pub fn kind(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(_) => Kind::Array,
        Value::Object(_) => Kind::Object,
    }
}

/// Two values can be graded against each other if they have the same kind.
pub fn compatible(left: &Value, right: &Value) -> bool {
    kind(left) == kind(right)
}

/// Structural equality where `60` and `60.0` are the same value.
pub fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loosely_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).map_or(false, |w| loosely_equal(v, w)))
        }
        _ => false,
    }
}

/// Removes repeated elements, keeping the first occurrence.
pub(crate) fn distinct(values: &[Value]) -> Vec<&Value> {
    let mut out: Vec<&Value> = Vec::with_capacity(values.len());
    for v in values {
        if !out.iter().any(|seen| loosely_equal(seen, v)) {
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_are_compatible_regardless_of_representation() {
        assert!(compatible(&json!(60), &json!(60.0)));
        assert!(loosely_equal(&json!(60), &json!(60.0)));
        assert!(!compatible(&json!("60"), &json!(60)));
    }

    #[test]
    fn nested_values_compare_loosely() {
        assert!(loosely_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!loosely_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let values = vec![json!(1), json!(1.0), json!("x"), json!(2)];
        let d = distinct(&values);
        assert_eq!(d.len(), 3);
        assert_eq!(d[1], &json!("x"));
    }
}
