use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tool_agent_core::{AgentConfig, RetryPolicy};
use tool_agent_openai_model::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAIConfig, OpenAIConfigBuilder,
    OpenAIProvider,
};

const API_KEY_VARS: [&str; 2] = ["OPENROUTER_API_KEY", "OPENAI_API_KEY"];
const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
const MODEL_VAR: &str = "OPENAI_MODEL";
const MAX_ITERATIONS_VAR: &str = "AGENT_MAX_ITERATIONS";
const MODEL_TIMEOUT_VAR: &str = "AGENT_MODEL_TIMEOUT_SECS";
const TOOL_TIMEOUT_VAR: &str = "AGENT_TOOL_TIMEOUT_SECS";
const MAX_RETRIES_VAR: &str = "AGENT_MAX_RETRIES";

const TEMPERATURE: f32 = 0.2;

/// Error returned by [`Settings::from_env`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Neither of the credential variables is set.
    #[error("set OPENROUTER_API_KEY (or OPENAI_API_KEY) to your API key")]
    MissingApiKey,
    /// A variable is set to something that cannot be parsed.
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Settings of the demo programs, read from the environment.
///
/// A `.env` file in the working directory is loaded first, variables that
/// are already set take precedence over it.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The endpoint configuration.
    pub openai: OpenAIConfig,
    /// The loop configuration.
    pub agent: AgentConfig,
}

impl Settings {
    /// Loads `.env` and reads the settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        match dotenv::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(err) => debug!("no .env loaded: {err}"),
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = API_KEY_VARS
            .iter()
            .find_map(|&name| lookup(name))
            .ok_or(SettingsError::MissingApiKey)?;
        let openai = OpenAIConfigBuilder::with_api_key(api_key)
            .with_base_url(
                lookup(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            )
            .with_model(lookup(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_owned()))
            .with_temperature(TEMPERATURE)
            .build();

        let mut agent = AgentConfig::default();
        if let Some(max_iterations) = parse(&lookup, MAX_ITERATIONS_VAR)? {
            agent.max_iterations = max_iterations;
        }
        if let Some(secs) = parse(&lookup, MODEL_TIMEOUT_VAR)? {
            agent.model_timeout = timeout_from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, TOOL_TIMEOUT_VAR)? {
            agent.tool_timeout = timeout_from_secs(secs);
        }
        if let Some(max_retries) = parse(&lookup, MAX_RETRIES_VAR)? {
            agent.retry = RetryPolicy {
                max_retries,
                ..agent.retry
            };
        }

        Ok(Self { openai, agent })
    }

    /// Creates a provider for the configured endpoint.
    #[inline]
    pub fn model_provider(&self) -> OpenAIProvider {
        OpenAIProvider::new(self.openai.clone())
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => Err(SettingsError::Invalid {
            name,
            reason: format!("{err}"),
            value,
        }),
    }
}

/// `0` turns the timeout off.
fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
