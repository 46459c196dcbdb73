//! Tunables of the agent loop.

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

/// Configuration of an [`Agent`](crate::Agent).
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    /// The maximum number of model calls in one invocation. The invocation
    /// fails with [`AgentError::MaxIterationsExceeded`] when the model still
    /// requests tools after this many calls.
    ///
    /// [`AgentError::MaxIterationsExceeded`]: crate::AgentError::MaxIterationsExceeded
    pub max_iterations: u32,
    /// Timeout of a single model request attempt, including streaming the
    /// whole response.
    pub model_timeout: Option<Duration>,
    /// Timeout of a single tool execution.
    pub tool_timeout: Option<Duration>,
    /// How retryable model failures are retried.
    pub retry: RetryPolicy,
    /// How tool-local failures affect the loop.
    pub tool_error_policy: ToolErrorPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 16,
            model_timeout: Some(Duration::from_secs(120)),
            tool_timeout: Some(Duration::from_secs(60)),
            retry: RetryPolicy::default(),
            tool_error_policy: ToolErrorPolicy::default(),
        }
    }
}

/// Exponential backoff for retryable model failures.
///
/// Authentication failures are never retried, whatever the policy says.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound of a single delay.
    pub max_interval: Duration,
    /// Growth factor of the delay between two retries.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[inline]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

/// Decides which tool failures end the invocation.
///
/// Execution failures and timeouts are always reported back to the model
/// as the tool result, so it can react to them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ToolErrorPolicy {
    /// Calls to unknown tools and calls with invalid arguments fail the
    /// invocation, once the other calls of the same batch have finished.
    #[default]
    Strict,
    /// Every tool failure is reported back to the model.
    Surface,
}
