//! Agent loop - task body driving the model and its tool calls

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use warden_bus::{Event, EventKind};
use warden_config::OperativeConfig;
use warden_provider::{ChatParams, Message, Provider, ToolCall, ToolChoice};
use warden_session::{TaskContext, TaskError, TaskOutcome, TaskRequest, TaskRunner};

use crate::batch::ParallelBatch;
use crate::context::{ToolCallContext, BUS_EXTENSION};
use crate::executor::ToolExecutor;
use crate::result::ToolResult;
use crate::{AgentError, Result};

/// Runs one task: asks the model, executes the tool calls it requests,
/// feeds the results back, until the model answers in plain text.
pub struct AgentLoop<P: Provider> {
    provider: Arc<P>,
    executor: Arc<ToolExecutor>,
    model: String,
    max_iterations: u32,
    parallel_tools: bool,
    batch_timeout: Duration,
}

impl<P: Provider> AgentLoop<P> {
    pub fn new(provider: P, executor: Arc<ToolExecutor>) -> Self {
        Self::with_config(provider, executor, &OperativeConfig::default())
    }

    pub fn with_config(provider: P, executor: Arc<ToolExecutor>, config: &OperativeConfig) -> Self {
        let model = if config.model.is_empty() {
            provider.default_model()
        } else {
            config.model.clone()
        };
        Self {
            provider: Arc::new(provider),
            executor,
            model,
            max_iterations: config.max_iterations,
            parallel_tools: config.parallel_tools,
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn call_context(&self, call: &ToolCall, ctx: &TaskContext) -> ToolCallContext {
        ToolCallContext::from_call(call)
            .with_cancellation(ctx.cancel.child_token())
            .with_metadata("task_id", json!(ctx.task_id))
            .with_metadata("session_id", json!(ctx.session_id))
            .with_extension(BUS_EXTENSION, Arc::new(ctx.bus.clone()))
    }

    /// Execute the requested calls, in parallel when allowed
    async fn run_tool_calls(&self, calls: &[ToolCall], ctx: &TaskContext) -> Result<Vec<ToolResult>> {
        if !self.parallel_tools || calls.len() < 2 {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                if ctx.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                debug!("Executing tool: {}", call.name);
                results.push(self.executor.execute(self.call_context(call, ctx)).await);
            }
            return Ok(results);
        }

        debug!("Executing {} tools in parallel", calls.len());
        let mut batch = ParallelBatch::new();
        for call in calls {
            let executor = self.executor.clone();
            let call_ctx = self.call_context(call, ctx);
            batch.add(async move { executor.execute(call_ctx).await })?;
        }
        batch.start()?;
        let items = batch.wait(Some(self.batch_timeout)).await?;

        Ok(items
            .into_iter()
            .zip(calls)
            .map(|(item, call)| {
                item.unwrap_or_else(|e| {
                    warn!("Tool {} did not complete: {}", call.name, e);
                    ToolResult::failure("The tool failed unexpectedly.").stamped(&call.name, &call.id)
                })
            })
            .collect())
    }

    async fn run_loop(&self, request: &TaskRequest, ctx: &TaskContext) -> Result<TaskOutcome> {
        let mut messages = request.history.clone();
        messages.push(Message::user(request.prompt.clone()));
        let first_new = messages.len();

        for iteration in 1..=self.max_iterations {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            debug!("Agent iteration {}", iteration);

            let params = ChatParams {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: self.executor.registry().list_call_signatures(),
                tool_choice: ToolChoice::Auto,
                ..Default::default()
            };
            let response = self
                .provider
                .chat(params)
                .await
                .map_err(|e| AgentError::Provider(e.to_string()))?;

            if !response.has_tool_calls() {
                let reply = response
                    .content
                    .unwrap_or_else(|| "Task completed.".to_string());
                messages.push(Message::assistant(reply.clone()));
                info!("Task {} answered after {} iteration(s)", ctx.task_id, iteration);
                return Ok(TaskOutcome::reply(reply).with_transcript(messages.split_off(first_new)));
            }

            messages.push(Message::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            let results = self.run_tool_calls(&response.tool_calls, ctx).await?;
            for result in results {
                ctx.publish(
                    Event::new(EventKind::ToolCompleted)
                        .with_payload("task_id", ctx.task_id)
                        .with_payload("result", &result),
                )
                .await;
                ctx.notify(EventKind::ToolCompleted, json!(result));
                messages.push(result.to_message());
            }
        }

        Err(AgentError::MaxIterations)
    }
}

#[async_trait]
impl<P: Provider + 'static> TaskRunner for AgentLoop<P> {
    async fn run(&self, request: TaskRequest, ctx: TaskContext) -> std::result::Result<TaskOutcome, TaskError> {
        Ok(self.run_loop(&request, &ctx).await?)
    }
}
