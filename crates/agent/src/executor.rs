//! Tool executor
//!
//! Resolves the tool, validates and coerces arguments, runs it under the
//! call's timeout and cancellation token, and turns every failure into a
//! failed [`ToolResult`]. Nothing is retried and nothing is propagated.

use std::error::Error as StdError;
use futures::FutureExt;
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

use warden_bus::panic_message;

use crate::context::ToolCallContext;
use crate::result::ToolResult;
use crate::tools::{validate_arguments, RegistryError, ToolError, ToolRegistry};

/// Failure class used to pick the message shown to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Permission,
    Timeout,
    Network,
    InvalidValue,
    Generic,
}

impl ErrorClass {
    /// Checked in this order; the first match wins
    const LADDER: [ErrorClass; 5] = [
        ErrorClass::NotFound,
        ErrorClass::Permission,
        ErrorClass::Timeout,
        ErrorClass::Network,
        ErrorClass::InvalidValue,
    ];

    pub fn message(self) -> &'static str {
        match self {
            ErrorClass::NotFound => "The requested file or resource could not be found.",
            ErrorClass::Permission => "Permission was denied for this operation.",
            ErrorClass::Timeout => "The operation took too long and was stopped.",
            ErrorClass::Network => "A network problem prevented the operation from completing.",
            ErrorClass::InvalidValue => "The tool was given a value it could not use.",
            ErrorClass::Generic => "The tool failed unexpectedly.",
        }
    }

    /// Classify an error by walking its source chain
    pub fn of(err: &(dyn StdError + 'static)) -> Self {
        let chain: Vec<&(dyn StdError + 'static)> = chain(err).collect();
        Self::LADDER
            .into_iter()
            .find(|class| chain.iter().any(|e| class.matches(*e)))
            .unwrap_or(ErrorClass::Generic)
    }

    fn matches(self, err: &(dyn StdError + 'static)) -> bool {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            let kind = io.kind();
            let by_kind = match self {
                ErrorClass::NotFound => kind == ErrorKind::NotFound,
                ErrorClass::Permission => kind == ErrorKind::PermissionDenied,
                ErrorClass::Timeout => kind == ErrorKind::TimedOut,
                ErrorClass::Network => matches!(
                    kind,
                    ErrorKind::ConnectionRefused
                        | ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::NotConnected
                        | ErrorKind::AddrNotAvailable
                        | ErrorKind::BrokenPipe
                ),
                ErrorClass::InvalidValue => {
                    matches!(kind, ErrorKind::InvalidInput | ErrorKind::InvalidData)
                }
                ErrorClass::Generic => false,
            };
            if by_kind {
                return true;
            }
        }

        match self {
            ErrorClass::Timeout if err.is::<tokio::time::error::Elapsed>() => return true,
            ErrorClass::InvalidValue if err.is::<serde_json::Error>() => return true,
            _ => {}
        }

        let text = err.to_string().to_lowercase();
        let needles: &[&str] = match self {
            ErrorClass::NotFound => &["not found", "no such file", "does not exist"],
            ErrorClass::Permission => &["permission", "denied", "forbidden", "unauthorized"],
            ErrorClass::Timeout => &["timed out", "timeout", "deadline"],
            ErrorClass::Network => &["connection", "network", "dns", "unreachable", "refused"],
            ErrorClass::InvalidValue => &["invalid", "parse", "must be", "expected"],
            ErrorClass::Generic => &[],
        };
        needles.iter().any(|n| text.contains(n))
    }
}

fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e| (*e).source())
}

/// Render an error with every source, outermost first
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    chain(err)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

/// Why an invocation did not produce output
#[derive(Error, Debug)]
enum InvocationError {
    #[error("{0}")]
    Tool(ToolError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Executes tool calls against a registry
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    default_timeout: Option<Duration>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            default_timeout: None,
        }
    }

    /// Timeout applied when the call context carries none
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one call; failures come back as a failed result
    pub async fn execute(&self, ctx: ToolCallContext) -> ToolResult {
        let started = Instant::now();
        let result = self.run(&ctx).await;
        result
            .with_execution_time(started.elapsed())
            .stamped(&ctx.tool_name, &ctx.call_id)
    }

    async fn run(&self, ctx: &ToolCallContext) -> ToolResult {
        let tool = match self.registry.get_instance(&ctx.tool_name) {
            Ok(tool) => tool,
            Err(e) => {
                debug!("Tool lookup failed: {}", e);
                return ToolResult::failure(match e {
                    RegistryError::NotFound(_) | RegistryError::Unavailable { .. } => e.to_string(),
                    RegistryError::Construction { .. } => {
                        error!("◆ TOOL {} FAILED: {}", ctx.tool_name, e);
                        format!("tool '{}' is not ready to run", ctx.tool_name)
                    }
                });
            }
        };

        let args = match validate_arguments(&tool.parameters(), ctx.arguments.clone()) {
            Ok(args) => args,
            Err(e) => {
                debug!("Rejected arguments for {}: {}", ctx.tool_name, e);
                return ToolResult::failure(e.to_string());
            }
        };

        match self.invoke(tool.as_ref(), ctx, args).await {
            Ok(content) => ToolResult::success(content),
            Err(InvocationError::Cancelled) => {
                debug!("Tool {} cancelled", ctx.tool_name);
                ToolResult::failure("The operation was cancelled.")
            }
            Err(InvocationError::TimedOut(limit)) => {
                error!(
                    "◆ TOOL {} [{}] TIMED OUT AFTER {:?}",
                    ctx.tool_name, ctx.call_id, limit
                );
                ToolResult::failure(ErrorClass::Timeout.message())
            }
            Err(InvocationError::Panicked(message)) => {
                error!(
                    "◆ TOOL {} [{}] PANICKED: {}",
                    ctx.tool_name, ctx.call_id, message
                );
                ToolResult::failure(ErrorClass::Generic.message())
            }
            Err(InvocationError::Tool(e)) => {
                error!(
                    "◆ TOOL {} [{}] FAILED: {}",
                    ctx.tool_name,
                    ctx.call_id,
                    error_chain(e.as_ref())
                );
                ToolResult::failure(ErrorClass::of(e.as_ref()).message())
            }
        }
    }

    async fn invoke(
        &self,
        tool: &dyn crate::tools::ToolTrait,
        ctx: &ToolCallContext,
        args: serde_json::Value,
    ) -> Result<String, InvocationError> {
        let limit = ctx.timeout.or(self.default_timeout);
        let body = async {
            AssertUnwindSafe(tool.execute(ctx, args))
                .catch_unwind()
                .await
                .map_err(|panic| panic_message(&*panic))
        };
        let call = async {
            let outcome = match limit {
                Some(limit) => match tokio::time::timeout(limit, body).await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(InvocationError::TimedOut(limit)),
                },
                None => body.await,
            };
            match outcome {
                Ok(result) => result.map_err(InvocationError::Tool),
                Err(message) => Err(InvocationError::Panicked(message)),
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(InvocationError::Cancelled),
            result = call => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn boxed(e: impl StdError + Send + Sync + 'static) -> ToolError {
        Box::new(e)
    }

    #[test]
    fn test_io_kinds_classify() {
        let cases = [
            (io::ErrorKind::NotFound, ErrorClass::NotFound),
            (io::ErrorKind::PermissionDenied, ErrorClass::Permission),
            (io::ErrorKind::TimedOut, ErrorClass::Timeout),
            (io::ErrorKind::ConnectionRefused, ErrorClass::Network),
            (io::ErrorKind::InvalidInput, ErrorClass::InvalidValue),
        ];
        for (kind, class) in cases {
            let err = boxed(io::Error::new(kind, "x"));
            assert_eq!(ErrorClass::of(err.as_ref()), class, "{:?}", kind);
        }
    }

    #[test]
    fn test_message_heuristics_follow_ladder() {
        // Matches both "not found" and "permission"; not-found is checked first
        let err: ToolError = "permission check: user not found".into();
        assert_eq!(ErrorClass::of(err.as_ref()), ErrorClass::NotFound);

        let err: ToolError = "upstream connection reset".into();
        assert_eq!(ErrorClass::of(err.as_ref()), ErrorClass::Network);

        let err: ToolError = "something odd".into();
        assert_eq!(ErrorClass::of(err.as_ref()), ErrorClass::Generic);
    }

    #[derive(Debug, Error)]
    #[error("loading config")]
    struct Outer(#[source] io::Error);

    #[test]
    fn test_source_chain_is_searched() {
        let err = boxed(Outer(io::Error::new(io::ErrorKind::PermissionDenied, "nope")));
        assert_eq!(ErrorClass::of(err.as_ref()), ErrorClass::Permission);
        assert_eq!(error_chain(err.as_ref()), "loading config: nope");
    }

    #[test]
    fn test_serde_errors_are_invalid_values() {
        let err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::InvalidValue);
    }
}
