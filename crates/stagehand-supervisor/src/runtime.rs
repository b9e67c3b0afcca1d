//! Runtime settings of a stage group: launcher, launcher parameters, retries.

use crate::config::PropertyMap;
use crate::policy::Retries;
use serde_json::Value;
use tracing::warn;

pub const JAVA_LOCATION_KEY: &str = "java-location";
pub const JVM_PARAMETERS_KEY: &str = "jvm-parameters";
pub const RETRIES_KEY: &str = "retries";

pub const DEFAULT_LAUNCHER: &str = "java";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Executable used to launch the group
    pub launcher: String,
    /// Raw parameter string, split by [`tokenize_parameters`] at launch
    pub parameters: Option<String>,
    pub retries: Retries,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            launcher: DEFAULT_LAUNCHER.to_string(),
            parameters: None,
            retries: Retries::Unlimited,
        }
    }
}

impl RuntimeConfig {
    pub fn with_parameters(parameters: Option<String>) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }

    /// Overlay recognized keys from `properties`.
    ///
    /// Absent or null keys keep their current value; unknown keys are
    /// ignored. Values of the wrong type are logged and ignored.
    pub fn merge(&mut self, properties: &PropertyMap) {
        if let Some(value) = present(properties, JAVA_LOCATION_KEY) {
            match value.as_str() {
                Some(launcher) => self.launcher = launcher.to_string(),
                None => warn!("Ignoring non-string {}: {}", JAVA_LOCATION_KEY, value),
            }
        }

        if let Some(value) = present(properties, JVM_PARAMETERS_KEY) {
            match value.as_str() {
                Some(parameters) => self.parameters = Some(parameters.to_string()),
                None => warn!("Ignoring non-string {}: {}", JVM_PARAMETERS_KEY, value),
            }
        }

        if let Some(value) = present(properties, RETRIES_KEY) {
            match parse_retries(value) {
                Ok(count) => match Retries::from_count(count) {
                    Some(retries) => self.retries = retries,
                    None => warn!("Ignoring negative {}: {}", RETRIES_KEY, count),
                },
                Err(e) => warn!("Ignoring {}: {}", RETRIES_KEY, e),
            }
        }
    }

    /// Launcher parameters as separate arguments.
    pub fn launch_parameters(&self) -> Vec<String> {
        self.parameters
            .as_deref()
            .map(tokenize_parameters)
            .unwrap_or_default()
    }
}

fn present<'a>(properties: &'a PropertyMap, key: &str) -> Option<&'a Value> {
    properties.get(key).filter(|v| !v.is_null())
}

/// Read a retry count from an integer or an integer string.
pub fn parse_retries(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("not an integer: {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("not an integer: {:?}", s)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

/// Split a parameter string at every whitespace character that directly
/// precedes a `-`.
///
/// `"-Xmx1g -Dname=a b -ea"` becomes `["-Xmx1g", "-Dname=a b", "-ea"]`, so
/// values may contain spaces as long as no word in them starts with `-`.
/// Tokens are trimmed and empty tokens dropped.
pub fn tokenize_parameters(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() && chars.peek() == Some(&'-') {
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    tokens.push(current);

    tokens
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> PropertyMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.launcher, "java");
        assert_eq!(config.retries, Retries::Unlimited);
        assert!(config.launch_parameters().is_empty());
    }

    #[test]
    fn test_merge_overlays_known_keys() {
        let mut config = RuntimeConfig::with_parameters(Some("-Xmx256m".to_string()));
        config.merge(&props(json!({
            "java-location": "/opt/jdk/bin/java",
            "retries": 2,
            "unrelated": true
        })));

        assert_eq!(config.launcher, "/opt/jdk/bin/java");
        assert_eq!(config.retries, Retries::Limited(2));
        assert_eq!(config.parameters.as_deref(), Some("-Xmx256m"));
    }

    #[test]
    fn test_merge_is_cumulative_and_ignores_nulls() {
        let mut config = RuntimeConfig::default();
        config.merge(&props(json!({ "jvm-parameters": "-ea", "retries": "3" })));
        config.merge(&props(json!({ "jvm-parameters": null, "retries": -1 })));

        assert_eq!(config.parameters.as_deref(), Some("-ea"));
        assert_eq!(config.retries, Retries::Unlimited);
    }

    #[test]
    fn test_merge_ignores_invalid_values() {
        let mut config = RuntimeConfig::default();
        config.merge(&props(json!({ "retries": 1 })));
        config.merge(&props(json!({
            "retries": -5,
            "java-location": 42
        })));
        config.merge(&props(json!({ "retries": "many" })));

        assert_eq!(config.retries, Retries::Limited(1));
        assert_eq!(config.launcher, "java");
    }

    #[test]
    fn test_parse_retries() {
        assert_eq!(parse_retries(&json!(4)), Ok(4));
        assert_eq!(parse_retries(&json!(" -1 ")), Ok(-1));
        assert!(parse_retries(&json!(1.5)).is_err());
        assert!(parse_retries(&json!([1])).is_err());
    }

    #[test]
    fn test_tokenize_parameters() {
        assert_eq!(
            tokenize_parameters("-Xmx1g -Dname=a b -ea"),
            vec!["-Xmx1g", "-Dname=a b", "-ea"]
        );
        assert_eq!(tokenize_parameters("-a  -b"), vec!["-a", "-b"]);
        assert!(tokenize_parameters("").is_empty());
        assert!(tokenize_parameters("   ").is_empty());
    }
}
