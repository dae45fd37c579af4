// Dispatcher: resolve, validate, invoke, and package the outcome

use crate::error::CapabilityError;
use crate::registry::CapabilityRegistry;
use crate::types::{InvocationRequest, InvocationResult};
use crate::validator::SchemaValidator;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Longest failure message returned to a caller
pub const MAX_ERROR_MESSAGE_LEN: usize = 200;

/// Routes invocations to registered capabilities.
///
/// Every failure, including a panicking handler, is turned into an
/// `InvocationResult::Error`; nothing propagates to the transport.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    validator: SchemaValidator,
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, validator: SchemaValidator) -> Self {
        Self { registry, validator }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Dispatch one invocation. Runs exactly one handler at most once.
    pub async fn dispatch(&self, request: InvocationRequest) -> InvocationResult {
        let kind = request.kind;
        let target = request.target.clone();
        tracing::debug!("Dispatching {} '{}'", kind, target);

        match self.try_dispatch(request).await {
            Ok(payload) => InvocationResult::ok(payload),
            Err(err) => {
                if let CapabilityError::HandlerFailure(detail) = &err {
                    tracing::warn!("{} '{}' failed: {}", kind, target, detail);
                } else {
                    tracing::debug!("{} '{}' rejected: {}", kind, target, err);
                }
                InvocationResult::error(err.kind(), client_message(&err))
            }
        }
    }

    async fn try_dispatch(&self, request: InvocationRequest) -> Result<String, CapabilityError> {
        // The registry lock is released before the handler runs
        let resolved = self.registry.lookup(request.kind, &request.target)?;

        let mut arguments = request.arguments;
        arguments.extend(resolved.bound);

        self.validator.validate(&resolved.capability.parameters, &arguments)?;

        let handler = resolved.capability.handler.clone();
        AssertUnwindSafe(handler.invoke(arguments))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(CapabilityError::handler("internal error")))
    }
}

/// Message shown to the caller: the first line of the error, truncated
fn client_message(err: &CapabilityError) -> String {
    let text = err.to_string();
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return first_line.to_string();
    }
    let mut truncated: String = first_line.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arguments, Capability, CapabilityHandler, ErrorKind, ParamType, ParameterSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Echo;

    #[async_trait::async_trait]
    impl CapabilityHandler for Echo {
        async fn invoke(&self, arguments: Arguments) -> Result<String, CapabilityError> {
            let text = arguments.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(text.to_string())
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait::async_trait]
    impl CapabilityHandler for Counting {
        async fn invoke(&self, _arguments: Arguments) -> Result<String, CapabilityError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n.to_string())
        }
    }

    struct Panics;

    #[async_trait::async_trait]
    impl CapabilityHandler for Panics {
        async fn invoke(&self, _arguments: Arguments) -> Result<String, CapabilityError> {
            panic!("secret internal state");
        }
    }

    struct Fails(String);

    #[async_trait::async_trait]
    impl CapabilityHandler for Fails {
        async fn invoke(&self, _arguments: Arguments) -> Result<String, CapabilityError> {
            Err(CapabilityError::handler(self.0.clone()))
        }
    }

    struct Slow;

    #[async_trait::async_trait]
    impl CapabilityHandler for Slow {
        async fn invoke(&self, _arguments: Arguments) -> Result<String, CapabilityError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("slow".to_string())
        }
    }

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    fn dispatcher() -> Dispatcher {
        let registry = CapabilityRegistry::new();
        registry
            .register(
                Capability::tool("echo", "Echo", Arc::new(Echo))
                    .with_param(ParameterSpec::required("text", ParamType::String)),
            )
            .unwrap();
        registry
            .register(Capability::tool("count", "Count", Arc::new(Counting(AtomicUsize::new(0)))))
            .unwrap();
        registry.register(Capability::tool("panics", "Panics", Arc::new(Panics))).unwrap();
        registry
            .register(Capability::tool("fails", "Fails", Arc::new(Fails("boom\nstack trace".to_string()))))
            .unwrap();
        registry
            .register(Capability::tool("verbose", "Verbose", Arc::new(Fails("x".repeat(500)))))
            .unwrap();
        registry.register(Capability::tool("slow", "Slow", Arc::new(Slow))).unwrap();
        Dispatcher::new(Arc::new(registry), SchemaValidator::default())
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let result = dispatcher()
            .dispatch(InvocationRequest::tool("echo", args(json!({"text": "hello"}))))
            .await;
        assert_eq!(result, InvocationResult::ok("hello"));
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let result = dispatcher()
            .dispatch(InvocationRequest::tool("nope", Arguments::new()))
            .await;
        assert_eq!(result, InvocationResult::error(ErrorKind::NotFound, "Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_validation_failure_skips_handler() {
        let result = dispatcher()
            .dispatch(InvocationRequest::tool("echo", args(json!({"text": 5}))))
            .await;
        assert_eq!(
            result,
            InvocationResult::error(
                ErrorKind::Validation,
                "Invalid argument 'text': expected string, got number"
            )
        );
    }

    #[tokio::test]
    async fn test_handler_invoked_once_per_request() {
        let dispatcher = dispatcher();
        let first = dispatcher.dispatch(InvocationRequest::tool("count", Arguments::new())).await;
        let second = dispatcher.dispatch(InvocationRequest::tool("count", Arguments::new())).await;
        assert_eq!(first.text(), "1");
        assert_eq!(second.text(), "2");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let result = dispatcher()
            .dispatch(InvocationRequest::tool("panics", Arguments::new()))
            .await;
        assert_eq!(result, InvocationResult::error(ErrorKind::HandlerFailure, "internal error"));
    }

    #[tokio::test]
    async fn test_failure_message_is_sanitized() {
        let dispatcher = dispatcher();

        let result = dispatcher.dispatch(InvocationRequest::tool("fails", Arguments::new())).await;
        assert_eq!(result, InvocationResult::error(ErrorKind::HandlerFailure, "boom"));

        let result = dispatcher.dispatch(InvocationRequest::tool("verbose", Arguments::new())).await;
        assert_eq!(result.text().chars().count(), MAX_ERROR_MESSAGE_LEN + 3);
    }

    #[tokio::test]
    async fn test_resource_placeholders_become_arguments() {
        // The echo handler reads `text`, so bind the placeholder under that name
        let registry = CapabilityRegistry::new();
        registry
            .register(Capability::resource("say://{text}", "say", "", Arc::new(Echo)).unwrap())
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry), SchemaValidator::default());

        let result = dispatcher.dispatch(InvocationRequest::resource("say://hi there")).await;
        assert_eq!(result, InvocationResult::ok("hi there"));

        let result = dispatcher.dispatch(InvocationRequest::resource("shout://hi")).await;
        assert_eq!(
            result,
            InvocationResult::error(ErrorKind::NotFound, "Unknown resource: shout://hi")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_does_not_block_others() {
        let dispatcher = dispatcher();

        let slow = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(InvocationRequest::tool("slow", Arguments::new())).await
            })
        };

        let echo = dispatcher
            .dispatch(InvocationRequest::tool("echo", args(json!({"text": "fast"}))))
            .await;
        assert_eq!(echo, InvocationResult::ok("fast"));
        assert!(!slow.is_finished());

        slow.abort();
    }
}
