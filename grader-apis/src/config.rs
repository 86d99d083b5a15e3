//! Process-wide configuration, read once at startup.
use serde::{Deserialize, Serialize};

/// What kind of evaluation is done against submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum EvaluationType {
    /// Submission prints a JSON object with answers on its last output line
    QuestionAnswer,
    /// Grader-provided tests are executed against the submission code base
    Functional,
}

/// `platform.yaml` representation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[serde(alias = "type")]
    pub evaluation_type: EvaluationType,

    /// Base image used in the submission image spec
    pub base_image: String,

    #[serde(default = "PlatformConfig::default_image_version")]
    pub base_image_version: String,

    /// Extensions of output files the submission is expected to produce
    #[serde(default)]
    pub output_extensions: Vec<String>,

    /// Arguments of the container entrypoint. May contain placeholders.
    #[serde(default)]
    pub entrypoint_args: Vec<String>,
}

impl PlatformConfig {
    fn default_image_version() -> String {
        String::from("latest")
    }

    /// Output extensions without leading dots, lowercased.
    pub fn normalized_output_extensions(&self) -> Vec<String> {
        self.output_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_platform_yaml() {
        let yaml = r#"
evaluationType: QuestionAnswer
baseImage: python
outputExtensions: [".txt", "JSON", ""]
entrypointArgs: ["python3", "%ENTRYPOINT_FILE%"]
"#;
        let cfg: PlatformConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.evaluation_type, EvaluationType::QuestionAnswer);
        assert_eq!(cfg.base_image_version, "latest");
        assert_eq!(cfg.normalized_output_extensions(), vec!["txt", "json"]);
        assert_eq!(cfg.entrypoint_args.len(), 2);
    }

    #[test]
    fn accepts_type_alias() {
        let yaml = "type: Functional\nbaseImage: mcr.microsoft.com/dotnet/sdk\nbaseImageVersion: \"6.0\"\n";
        let cfg: PlatformConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.evaluation_type, EvaluationType::Functional);
        assert_eq!(cfg.base_image_version, "6.0");
    }
}
