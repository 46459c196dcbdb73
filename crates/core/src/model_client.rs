use std::fmt::{self, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use tokio::time::{sleep, timeout};
use tool_agent_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

use crate::config::RetryPolicy;

pub(crate) type TranscriptFn = Arc<dyn Fn(&str) + Send + Sync>;

type SendRequestResult = Result<ModelClientResponse, ModelClientError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Option<TranscriptFn>)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
///
/// Retryable failures are retried with exponential backoff, and every
/// attempt is bounded by the configured timeout.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_transcript| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_transcript).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    #[inline]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends a request and returns the response, retrying retryable
    /// failures.
    ///
    /// Transcript deltas of failed attempts may already have been delivered
    /// to `on_transcript` when a retry starts.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_transcript: Option<TranscriptFn>,
    ) -> SendRequestResult {
        let mut backoff = self.retry.backoff();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.send_once(req.clone(), on_transcript.clone()).await
            {
                Ok(mut resp) => {
                    resp.attempts = attempts;
                    return Ok(resp);
                }
                Err(err) => err.with_attempts(attempts),
            };

            if !err.kind.is_retryable() || attempts > self.retry.max_retries {
                error!("model request failed after {attempts} attempt(s): {err}");
                return Err(err);
            }
            let Some(delay) = backoff.next_backoff() else {
                return Err(err);
            };
            warn!("model request failed ({err}), retrying in {delay:?}");
            sleep(delay).await;
        }
    }

    async fn send_once(
        &self,
        req: ModelRequest,
        on_transcript: Option<TranscriptFn>,
    ) -> SendRequestResult {
        let fut = (self.handler_fn)(req, on_transcript);
        let Some(duration) = self.timeout else {
            return fut.await;
        };
        match timeout(duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(ModelClientError::new(
                ErrorKind::Transport,
                format!("timed out after {duration:?}"),
            )),
        }
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub struct ModelClientResponse {
    pub transcript: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
    /// How many attempts it took to get this response.
    pub attempts: u32,
}

/// A failed model request, after any retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelClientError {
    kind: ErrorKind,
    message: String,
    attempts: u32,
}

impl ModelClientError {
    fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            attempts: 1,
        }
    }

    fn from_provider<E: ModelProviderError>(err: E) -> Self {
        Self::new(err.kind(), format!("{err}"))
    }

    fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn into_message(self) -> String {
        self.message
    }
}

impl Display for ModelClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_transcript: Option<TranscriptFn>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            debug!("got an error: {err:?}");
            return Err(ModelClientError::from_provider(err));
        }
    };

    let mut transcript = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                debug!("got an error while streaming: {err:?}");
                return Err(ModelClientError::from_provider(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                if let Some(on_transcript) = &on_transcript {
                    on_transcript(&msg);
                }
                transcript.push_str(&msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(ModelClientResponse {
        transcript,
        tool_calls,
        finish_reason,
        attempts: 1,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tool_agent_model::ModelMessage;
    use tool_agent_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn hi_request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(100),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_turn(PresetResponse::with_events([
            PresetEvent::MessageDelta("How ".to_owned()),
            PresetEvent::MessageDelta("are ".to_owned()),
            PresetEvent::MessageDelta("you?".to_owned()),
        ]));

        let model_client = ModelClient::new(model_provider);

        for _ in 0..3 {
            let on_transcript_called = Arc::new(AtomicBool::new(false));
            let on_transcript: TranscriptFn = {
                let on_transcript_called = Arc::clone(&on_transcript_called);
                Arc::new(move |_: &str| {
                    on_transcript_called.store(true, Ordering::Relaxed);
                })
            };
            let resp = model_client
                .send_request(hi_request(), Some(on_transcript))
                .await
                .unwrap();
            assert_eq!(resp.transcript, "How are you?");
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
            assert_eq!(resp.attempts, 1);
            assert!(on_transcript_called.load(Ordering::Relaxed));
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider.clone());
        let err = model_client
            .send_request(hi_request(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.attempts(), 1);
        assert_eq!(model_provider.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transport_errors() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_assistant_turn(PresetResponse::text("Hello").with_failures(2));
        let model_client =
            ModelClient::new(model_provider.clone()).with_retry(fast_retry(3));

        let resp = model_client.send_request(hi_request(), None).await.unwrap();
        assert_eq!(resp.transcript, "Hello");
        assert_eq!(resp.attempts, 3);
        assert_eq!(model_provider.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_assistant_turn(PresetResponse::text("Hello").with_failures(0));
        let model_client =
            ModelClient::new(model_provider.clone()).with_retry(fast_retry(2));

        let err = model_client
            .send_request(hi_request(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.attempts(), 3);
        assert_eq!(model_provider.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_is_not_retried() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_turn(
            PresetResponse::text("Hello")
                .with_failures(0)
                .with_failure_kind(ErrorKind::Auth),
        );
        let model_client =
            ModelClient::new(model_provider.clone()).with_retry(fast_retry(5));

        let err = model_client
            .send_request(hi_request(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.attempts(), 1);
        assert_eq!(model_provider.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_turn(PresetResponse::text("Hello"));
        model_provider.set_delay(Duration::from_secs(10));
        let model_client = ModelClient::new(model_provider)
            .with_retry(RetryPolicy::none())
            .with_timeout(Some(Duration::from_secs(1)));

        let err = model_client
            .send_request(hi_request(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.into_message().contains("timed out"));
    }
}
