//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Engine tuning shared by every workflow the agent runs.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent name for identification in logs.
    pub name: String,
    /// Number of conversation messages kept when building the model context.
    pub history_window: usize,
    /// Hard cap on node executions per `invoke`/`resume` call.
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "mentor".to_string(),
            history_window: 15,
            max_steps: 50,
        }
    }
}

/// Process-wide configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Thread id used by the single-session HTTP surface.
    pub thread_id: String,
    /// User id used to namespace profile entries.
    pub user_id: String,
    /// Knowledge graph JSON file.
    pub graph_path: PathBuf,
    /// libSQL database file.
    pub db_path: PathBuf,
    pub http_port: u16,
    /// Origin allowed by the CORS layer.
    pub frontend_origin: String,
    pub base_url: String,
    pub model: String,
    pub api_key: SecretString,
    pub agent: AgentConfig,
}

impl AppConfig {
    /// Read configuration from `MENTOR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let api_key = required("OPENAI_API_KEY")?;
        let graph_path = PathBuf::from(required("MENTOR_GRAPH_PATH")?);

        let http_port = parse_or(&lookup, "MENTOR_HTTP_PORT", 8000u16)?;
        let defaults = AgentConfig::default();
        let history_window = parse_or(&lookup, "MENTOR_HISTORY_WINDOW", defaults.history_window)?;
        let max_steps = parse_or(&lookup, "MENTOR_MAX_STEPS", defaults.max_steps)?;
        if max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MENTOR_MAX_STEPS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            thread_id: lookup("MENTOR_THREAD").unwrap_or_else(|| "default".to_string()),
            user_id: lookup("MENTOR_USER_ID").unwrap_or_else(|| "default".to_string()),
            graph_path,
            db_path: lookup("MENTOR_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/mentor.db")),
            http_port,
            frontend_origin: lookup("MENTOR_FRONTEND_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            base_url: lookup("MENTOR_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: lookup("MENTOR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: SecretString::from(api_key),
            agent: AgentConfig {
                history_window,
                max_steps,
                ..defaults
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MENTOR_GRAPH_PATH", "/tmp/graph.json"),
        ]))
        .unwrap();

        assert_eq!(config.thread_id, "default");
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.agent.history_window, 15);
        assert_eq!(config.api_key.expose_secret(), "sk-test");
    }

    #[test]
    fn missing_api_key_is_reported() {
        let err = AppConfig::from_lookup(lookup_from(&[("MENTOR_GRAPH_PATH", "g.json")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "OPENAI_API_KEY"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MENTOR_GRAPH_PATH", "g.json"),
            ("MENTOR_HTTP_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MENTOR_HTTP_PORT"));
    }

    #[test]
    fn zero_step_limit_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MENTOR_GRAPH_PATH", "g.json"),
            ("MENTOR_MAX_STEPS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
