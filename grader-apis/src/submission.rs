use serde::{Deserialize, Serialize};
use std::fmt;

/// One roster entry: whose code it is and where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSubmission")]
pub struct Submission {
    name: String,
    source_url: String,
    /// Container-safe version of `name`. Always derived from it.
    #[serde(skip_deserializing)]
    sanitized_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSubmission {
    name: String,
    source_url: String,
}

impl From<RawSubmission> for Submission {
    fn from(raw: RawSubmission) -> Self {
        Submission::new(raw.name, raw.source_url)
    }
}

impl Submission {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Submission {
        let name = name.into();
        let sanitized_name = sanitize(&name);
        Submission {
            name,
            source_url: source_url.into(),
            sanitized_name,
        }
    }

    /// Name of individual or team who submitted this
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn sanitized_name(&self) -> &str {
        &self.sanitized_name
    }

    /// Tag of the image built for this submission.
    pub fn image_tag(&self) -> String {
        format!("{}:latest", self.sanitized_name.to_lowercase())
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.source_url)
    }
}

/// Replaces everything except ASCII alphanumerics and underscore.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_name_replaces_non_word_chars() {
        let s = Submission::new("Team Rocket-42!", "https://example.com/rocket.git");
        assert_eq!(s.sanitized_name(), "Team_Rocket_42_");
        assert_eq!(s.image_tag(), "team_rocket_42_:latest");
    }

    #[test]
    fn non_ascii_letters_are_replaced() {
        assert_eq!(sanitize("Zoë"), "Zo_");
    }

    #[test]
    fn sanitized_name_is_rederived_on_deserialize() {
        let json = r#"{"name":"a b","sourceUrl":"x","sanitizedName":"evil/name"}"#;
        let s: Submission = serde_json::from_str(json).unwrap();
        assert_eq!(s.sanitized_name(), "a_b");
    }
}
