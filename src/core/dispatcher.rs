//! Request dispatch.
//!
//! Each request runs through its own small state machine:
//!
//! ```text
//! Received -> Validating -> Executing -> Completed
//! Received -> Failed            (malformed frame, unknown method)
//! ```
//!
//! `Failed` is a wire-level error response. Everything that happens after a
//! request is structurally valid (unknown tool, schema violations, handler
//! faults, timeouts) completes with an ordinary result whose `isError` flag is
//! set. Handlers run in their own task, so a panic or a hang stays contained.
//! Registered interceptors wrap the `Executing` phase.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{Span, debug, error, info, instrument, warn};

use super::protocol::{CallToolParams, Method, RequestMessage, ResponseMessage};
use super::server::ServerState;
use crate::domains::tools::{RegisteredTool, ToolDescriptor, ToolError, ToolResult, ValidationOptions};

/// Lifecycle phase of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Validating,
    Executing,
    Completed,
    Failed,
}

impl RequestPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter_phase(phase: RequestPhase) {
    Span::current().record("phase", phase.as_str());
    debug!(%phase, "Request phase");
}

/// Result payload of `list_tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// Routes requests to the registry and runs tool handlers.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<ServerState>,
}

impl Dispatcher {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Decode a raw frame and dispatch it.
    ///
    /// Used by request/response transports that have no session of their own.
    pub async fn dispatch_frame(&self, frame: &[u8]) -> ResponseMessage {
        match RequestMessage::decode(frame) {
            Ok(request) => self.dispatch(request).await,
            Err(err) => {
                warn!(phase = %RequestPhase::Failed, "Rejected request: {}", err);
                err.into_response()
            }
        }
    }

    /// Dispatch a decoded request and build its response.
    ///
    /// Never fails: every outcome, including handler faults, is a response
    /// carrying the request's id.
    #[instrument(
        name = "request",
        skip_all,
        fields(id = %request.id, method = request.method.name(), phase = tracing::field::Empty)
    )]
    pub async fn dispatch(&self, request: RequestMessage) -> ResponseMessage {
        enter_phase(RequestPhase::Received);

        let RequestMessage { id, method } = request;
        let response = match method {
            Method::ListTools => {
                let tools = self.state.registry().list();
                info!("Listing {} tool(s)", tools.len());
                ResponseMessage::from_result(id, &ListToolsResult { tools })
            }
            Method::CallTool(params) => {
                let result = self.call_tool(params).await;
                ResponseMessage::from_result(id, &result)
            }
        };

        enter_phase(RequestPhase::Completed);
        response
    }

    /// Resolve, validate and execute a tool call.
    #[instrument(skip_all, fields(tool = %params.name, phase = tracing::field::Empty))]
    pub async fn call_tool(&self, params: CallToolParams) -> ToolResult {
        let CallToolParams { name, arguments } = params;
        enter_phase(RequestPhase::Validating);

        let tool = match self.state.registry().resolve(&name) {
            Ok(tool) => tool,
            Err(err) => {
                warn!("Unknown tool requested: {}", name);
                return ToolResult::error_text(err.public_message());
            }
        };

        let options = ValidationOptions {
            strict: self.state.config().dispatch.strict_schemas,
        };
        if let Err(violations) = tool.schema().validate(&arguments, options) {
            warn!(
                violations = violations.len(),
                "Arguments rejected: {}", violations
            );
            return ToolResult::error_text(format!(
                "Invalid arguments for tool '{}': {}",
                name, violations
            ));
        }

        enter_phase(RequestPhase::Executing);
        self.state
            .interceptors()
            .run(&name, arguments, |arguments| self.execute(&tool, arguments))
            .await
    }

    /// Run a handler in its own task, bounded by the configured timeout.
    ///
    /// On timeout the handler task is detached, not aborted.
    async fn execute(&self, tool: &RegisteredTool, arguments: Value) -> ToolResult {
        let handler = tool.handler();
        let task = tokio::spawn(async move { handler.call(arguments).await });

        let joined = match self.state.config().dispatch.call_timeout() {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Tool '{}' did not finish within {:?}; abandoning it", tool.name(), limit);
                    return ToolResult::error_text(ToolError::Timeout(limit).public_message());
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(result)) => {
                debug!(is_error = result.is_error, "Tool '{}' completed", tool.name());
                result
            }
            Ok(Err(err)) => {
                warn!("Tool '{}' failed: {}", tool.name(), err);
                ToolResult::error_text(err.public_message())
            }
            Err(join_err) if join_err.is_panic() => {
                error!("Tool '{}' panicked", tool.name());
                ToolResult::error_text(ToolError::internal("handler panicked").public_message())
            }
            Err(join_err) => {
                warn!("Tool '{}' task was cancelled: {}", tool.name(), join_err);
                ToolResult::error_text("Tool execution was cancelled")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::interceptor::ToolInterceptor;
    use crate::core::protocol::{RequestId, error_codes};
    use crate::domains::tools::{ToolRegistry, handler_fn};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn weather_descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_weather",
            "Get the weather for a city",
            json!({
                "type": "object",
                "properties": { "city": { "type": "string", "description": "City name" } },
                "required": ["city"]
            }),
        )
    }

    /// Dispatcher with a counting `get_weather` stub.
    fn setup(config: Config) -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new();

        let counter = Arc::clone(&calls);
        registry
            .register(
                weather_descriptor(),
                handler_fn(move |args: Value| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let city = args["city"].as_str().unwrap_or_default().to_string();
                        Ok(ToolResult::text(format!("{}: sunny", city)))
                    }
                }),
            )
            .unwrap();

        let state = Arc::new(ServerState::new(config, registry));
        (Dispatcher::new(state), calls)
    }

    fn call(id: i64, name: &str, arguments: Value) -> RequestMessage {
        RequestMessage::new(
            id,
            Method::CallTool(CallToolParams {
                name: name.to_string(),
                arguments,
            }),
        )
    }

    fn tool_result(response: &ResponseMessage) -> ToolResult {
        serde_json::from_value(response.result().unwrap().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_list_tools_returns_registered_descriptors() {
        let (dispatcher, _) = setup(Config::default());
        let response = dispatcher
            .dispatch(RequestMessage::new("list-1", Method::ListTools))
            .await;

        assert_eq!(response.id, Some(RequestId::from("list-1")));
        let tools = &response.result().unwrap()["tools"];
        assert_eq!(tools, &json!([serde_json::to_value(weather_descriptor()).unwrap()]));
    }

    #[tokio::test]
    async fn test_call_tool_success() {
        let (dispatcher, calls) = setup(Config::default());
        let response = dispatcher
            .dispatch(call(7, "get_weather", json!({ "city": "Paris" })))
            .await;

        assert_eq!(response.id, Some(RequestId::Number(7)));
        let result = tool_result(&response);
        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("Paris: sunny"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_required_never_reaches_handler() {
        let (dispatcher, calls) = setup(Config::default());
        let response = dispatcher.dispatch(call(1, "get_weather", json!({}))).await;

        let result = tool_result(&response);
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("$.city"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_type_never_reaches_handler() {
        let (dispatcher, calls) = setup(Config::default());
        for arguments in [json!({ "city": 3 }), json!({ "city": null }), json!("Paris")] {
            let response = dispatcher.dispatch(call(1, "get_weather", arguments)).await;
            assert!(tool_result(&response).is_error);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_strict_schemas_reject_extra_properties() {
        let mut config = Config::default();
        config.dispatch.strict_schemas = true;
        let (dispatcher, calls) = setup(config);

        let response = dispatcher
            .dispatch(call(1, "get_weather", json!({ "city": "Paris", "units": "c" })))
            .await;
        assert!(tool_result(&response).is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let (dispatcher, calls) = setup(Config::default());
        let response = dispatcher
            .dispatch(call(1, "get_weather", json!({ "city": "Paris", "units": "c" })))
            .await;
        assert!(!tool_result(&response).is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_business_error() {
        let (dispatcher, calls) = setup(Config::default());
        let response = dispatcher
            .dispatch(call(9, "get_forecast", json!({})))
            .await;

        assert!(response.error_object().is_none());
        let result = tool_result(&response);
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("get_forecast"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_sanitized() {
        let (dispatcher, _) = setup(Config::default());
        dispatcher
            .state
            .registry()
            .register(
                ToolDescriptor::new("leaky", "fails", json!({ "type": "object" })),
                handler_fn(|_args: Value| async {
                    Err(ToolError::execution_failed("connect to 10.0.0.5:5432 failed"))
                }),
            )
            .unwrap();

        let response = dispatcher.dispatch(call(1, "leaky", json!({}))).await;
        let result = tool_result(&response);
        assert!(result.is_error);
        assert!(!result.first_text().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (dispatcher, calls) = setup(Config::default());
        dispatcher
            .state
            .registry()
            .register(
                ToolDescriptor::new("boom", "panics", json!({ "type": "object" })),
                handler_fn(|_args: Value| async {
                    if true {
                        panic!("handler blew up");
                    }
                    Ok(ToolResult::text("unreachable"))
                }),
            )
            .unwrap();

        let response = dispatcher.dispatch(call(1, "boom", json!({}))).await;
        assert_eq!(response.id, Some(RequestId::Number(1)));
        assert!(tool_result(&response).is_error);

        // The dispatcher keeps working afterwards.
        let response = dispatcher
            .dispatch(call(2, "get_weather", json!({ "city": "Oslo" })))
            .await;
        assert_eq!(tool_result(&response).first_text(), Some("Oslo: sunny"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_timeout_abandons_handler() {
        let mut config = Config::default();
        config.dispatch.call_timeout_ms = 50;
        let (dispatcher, _) = setup(config);

        let finished = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&finished);
        dispatcher
            .state
            .registry()
            .register(
                ToolDescriptor::new("slow", "sleeps", json!({ "type": "object" })),
                handler_fn(move |_args: Value| {
                    let flag = Arc::clone(&flag);
                    async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        flag.fetch_add(1, Ordering::SeqCst);
                        Ok(ToolResult::text("late"))
                    }
                }),
            )
            .unwrap();

        let response = dispatcher.dispatch(call(1, "slow", json!({}))).await;
        let result = tool_result(&response);
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("timed out"));

        // Abandoned, not killed: the handler still runs to completion.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_business_error_passes_through() {
        let (dispatcher, _) = setup(Config::default());
        dispatcher
            .state
            .registry()
            .register(
                ToolDescriptor::new("picky", "refuses", json!({ "type": "object" })),
                handler_fn(|_args: Value| async {
                    Ok(ToolResult::error_text("no forecast for Atlantis"))
                }),
            )
            .unwrap();

        let response = dispatcher.dispatch(call(1, "picky", json!({}))).await;
        let result = tool_result(&response);
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("no forecast for Atlantis"));
    }

    #[tokio::test]
    async fn test_dispatch_frame_protocol_errors() {
        let (dispatcher, calls) = setup(Config::default());

        let response = dispatcher.dispatch_frame(b"not json").await;
        assert_eq!(response.id, None);
        assert_eq!(response.error_object().unwrap().code, error_codes::PARSE_ERROR);

        let response = dispatcher
            .dispatch_frame(br#"{"id":5,"method":"resources/list"}"#)
            .await;
        assert_eq!(response.id, Some(RequestId::Number(5)));
        assert_eq!(
            response.error_object().unwrap().code,
            error_codes::METHOD_NOT_FOUND
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_frame_success() {
        let (dispatcher, _) = setup(Config::default());
        let response = dispatcher
            .dispatch_frame(
                br#"{"id":"a","method":"call_tool","params":{"name":"get_weather","arguments":{"city":"Rome"}}}"#,
            )
            .await;
        assert_eq!(tool_result(&response).first_text(), Some("Rome: sunny"));
    }

    struct CountingInterceptor {
        before: Arc<AtomicUsize>,
        after: Arc<AtomicUsize>,
        deny: bool,
    }

    #[async_trait::async_trait]
    impl ToolInterceptor for CountingInterceptor {
        fn name(&self) -> &str {
            "counting"
        }

        async fn before_call(&self, _tool: &str, _arguments: &Value) -> Option<ToolResult> {
            self.before.fetch_add(1, Ordering::SeqCst);
            self.deny.then(|| ToolResult::error_text("calls are paused"))
        }

        async fn after_call(&self, _tool: &str, _result: &ToolResult) {
            self.after.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_interceptors_see_only_validated_calls() {
        let (dispatcher, calls) = setup(Config::default());
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        dispatcher.state.interceptors().add(Arc::new(CountingInterceptor {
            before: Arc::clone(&before),
            after: Arc::clone(&after),
            deny: false,
        }));

        let response = dispatcher
            .dispatch(call(1, "get_weather", json!({ "city": "Lima" })))
            .await;
        assert_eq!(tool_result(&response).first_text(), Some("Lima: sunny"));

        let response = dispatcher.dispatch(call(2, "get_weather", json!({}))).await;
        assert!(tool_result(&response).is_error);

        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interceptor_can_answer_instead_of_handler() {
        let (dispatcher, calls) = setup(Config::default());
        let after = Arc::new(AtomicUsize::new(0));
        dispatcher.state.interceptors().add(Arc::new(CountingInterceptor {
            before: Arc::new(AtomicUsize::new(0)),
            after: Arc::clone(&after),
            deny: true,
        }));

        let response = dispatcher
            .dispatch(call(1, "get_weather", json!({ "city": "Lima" })))
            .await;
        let result = tool_result(&response);
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("calls are paused"));
        assert_eq!(after.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_phase_terminality() {
        assert!(RequestPhase::Completed.is_terminal());
        assert!(RequestPhase::Failed.is_terminal());
        assert!(!RequestPhase::Executing.is_terminal());
        assert_eq!(RequestPhase::Validating.to_string(), "validating");
    }
}
