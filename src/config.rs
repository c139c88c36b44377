use log::warn;
use std::env;
use std::str::FromStr;

use crate::quota::DEFAULT_FREE_QUESTIONS;

pub const DEFAULT_PAYMENT_URL: &str = "<YOUR_PAYMENT_URL>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Deterministic stand-in that echoes the prompt.
    Echo,
    /// OpenAI-compatible chat completions server.
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModelSettings {
    pub server_url: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub free_question_limit: u32,
    pub payment_url: String,
    pub generator: GeneratorKind,
    pub remote_model: RemoteModelSettings,
    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let generator = match lookup("REPLY_GENERATOR").as_deref().map(str::trim) {
            None | Some("") | Some("echo") => GeneratorKind::Echo,
            Some("remote") => GeneratorKind::Remote,
            Some(other) => {
                warn!("Unknown REPLY_GENERATOR '{}', using echo", other);
                GeneratorKind::Echo
            }
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty() && *origin != "*")
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 8080),
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://chat.db".to_string()),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5),
            free_question_limit: parse_or(&lookup, "FREE_QUESTION_LIMIT", DEFAULT_FREE_QUESTIONS),
            payment_url: lookup("PAYMENT_URL").unwrap_or_else(|| DEFAULT_PAYMENT_URL.to_string()),
            generator,
            remote_model: RemoteModelSettings {
                server_url: lookup("MODEL_SERVER_URL")
                    .unwrap_or_else(|| "http://localhost:8081".to_string()),
                max_tokens: parse_or(&lookup, "MAX_TOKENS", 512),
                temperature: parse_or(&lookup, "TEMPERATURE", 0.7),
                top_p: parse_or(&lookup, "TOP_P", 0.95),
                timeout_secs: parse_or(&lookup, "MODEL_TIMEOUT_SECS", 60),
            },
            cors_allowed_origins,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}='{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let settings = settings_from(&[]);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.database_url, "sqlite://chat.db");
        assert_eq!(settings.free_question_limit, 3);
        assert_eq!(settings.payment_url, "<YOUR_PAYMENT_URL>");
        assert_eq!(settings.generator, GeneratorKind::Echo);
        assert_eq!(settings.remote_model.max_tokens, 512);
        assert!(settings.cors_allowed_origins.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let settings = settings_from(&[
            ("PORT", "9000"),
            ("FREE_QUESTION_LIMIT", "5"),
            ("REPLY_GENERATOR", "remote"),
            ("MODEL_SERVER_URL", "http://model:8000"),
            ("TEMPERATURE", "0.2"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ]);
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.free_question_limit, 5);
        assert_eq!(settings.generator, GeneratorKind::Remote);
        assert_eq!(settings.remote_model.server_url, "http://model:8000");
        assert!((settings.remote_model.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(
            settings.cors_allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        let settings = settings_from(&[
            ("PORT", "not-a-port"),
            ("FREE_QUESTION_LIMIT", "-1"),
            ("REPLY_GENERATOR", "gpt"),
        ]);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.free_question_limit, 3);
        assert_eq!(settings.generator, GeneratorKind::Echo);
    }

    #[test]
    fn wildcard_origin_means_any() {
        let settings = settings_from(&[("CORS_ALLOWED_ORIGINS", "*")]);
        assert!(settings.cors_allowed_origins.is_empty());
    }
}
