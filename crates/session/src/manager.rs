//! Per-connection receive loop
//!
//! A connection is idle until a chat message arrives, then running until its
//! task finishes, fails or is cancelled. Only one task runs per connection:
//! a new chat cancels the current task and waits for it to unwind first.

use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_bus::{
    panic_message, ChatMessage, ClientMessage, ContextType, Event, EventBus, EventKind,
    InitMessage, Outbound, ProtocolError, ServerMessage, Transport,
};
use warden_config::SessionConfig;
use warden_ids::SnowflakeGenerator;
use warden_provider::Message;
use warden_state::{FieldType, SharedState};

use crate::history::History;
use crate::runner::{TaskContext, TaskRequest, TaskRunner};

/// Message shown to clients for any connection-level failure
pub const SERVICE_EXCEPTION: &str = "service exception";

/// State field holding the number of open connections
pub const ACTIVE_SESSIONS_FIELD: &str = "sessions.active";

/// Why a receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Disconnected,
    ProtocolError,
    /// The runtime is stopping
    Shutdown,
}

struct RunningTask {
    task_id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives sessions; one instance serves every connection
pub struct SessionManager {
    runner: Arc<dyn TaskRunner>,
    bus: EventBus,
    state: Arc<SharedState>,
    ids: Arc<SnowflakeGenerator>,
    config: SessionConfig,
    active: AtomicUsize,
}

impl SessionManager {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        bus: EventBus,
        state: Arc<SharedState>,
        ids: Arc<SnowflakeGenerator>,
        config: SessionConfig,
    ) -> Self {
        if let Err(e) = state.register(ACTIVE_SESSIONS_FIELD, json!(0), Some(FieldType::Number)) {
            warn!("Failed to register {}: {}", ACTIVE_SESSIONS_FIELD, e);
        }
        Self {
            runner,
            bus,
            state,
            ids,
            config,
            active: AtomicUsize::new(0),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn record_active(&self, count: usize) {
        if let Err(e) = self.state.update(ACTIVE_SESSIONS_FIELD, json!(count)) {
            warn!("Failed to update {}: {}", ACTIVE_SESSIONS_FIELD, e);
        }
    }

    /// Run the receive loop for one connection until it disconnects or
    /// sends a message that cannot be understood.
    pub async fn serve(&self, transport: Transport) -> SessionEnd {
        self.serve_until(transport, CancellationToken::new()).await
    }

    /// Like [`serve`](Self::serve), but also ends when `shutdown` is
    /// cancelled. The running task is cancelled and awaited either way.
    pub async fn serve_until(&self, transport: Transport, shutdown: CancellationToken) -> SessionEnd {
        let Transport {
            mut inbound,
            outbound,
        } = transport;

        let session_id = match self.ids.next_id().await {
            Ok(id) => id.to_string(),
            Err(e) => {
                warn!("Falling back to a timestamp session id: {}", e);
                format!("session-{}", chrono::Local::now().timestamp_millis())
            }
        };

        self.record_active(self.active.fetch_add(1, Ordering::SeqCst) + 1);
        info!("◆ SESSION {} OPEN", session_id);

        let mut conn = Connection {
            manager: self,
            session_id,
            outbound,
            history: Arc::new(Mutex::new(History::with_max_messages(
                self.config.max_history_messages,
            ))),
            current: None,
        };

        let end = loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break SessionEnd::Shutdown,
                frame = inbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break SessionEnd::Disconnected,
                },
            };
            self.state.touch();

            match ClientMessage::parse(&frame) {
                Ok(ClientMessage::Init(init)) => conn.on_init(init).await,
                Ok(ClientMessage::Chat(chat)) => match chat.context_type {
                    ContextType::Interrupt => conn.on_interrupt(chat).await,
                    ContextType::Normal | ContextType::FollowUp => conn.on_chat(chat).await,
                },
                Err(e) => {
                    conn.on_protocol_error(&e).await;
                    if self.config.close_on_protocol_error {
                        break SessionEnd::ProtocolError;
                    }
                }
            }
        };

        conn.cancel_current("connection closed").await;
        self.record_active(self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1));
        info!("◆ SESSION {} CLOSED ({:?})", conn.session_id, end);
        end
    }
}

struct Connection<'a> {
    manager: &'a SessionManager,
    session_id: String,
    outbound: Outbound,
    history: Arc<Mutex<History>>,
    current: Option<RunningTask>,
}

impl Connection<'_> {
    async fn publish(&self, event: Event) -> Event {
        self.manager
            .bus
            .publish(event.with_session(self.session_id.clone()))
            .await
    }

    async fn on_init(&mut self, init: InitMessage) {
        debug!("Init from session {}", self.session_id);
        let mut event = Event::new(EventKind::Initialized).with_payload("message_id", &init.message_id);
        for (key, value) in init.extra {
            event.payload.insert(key, value);
        }
        self.publish(event).await;
        self.outbound.send(ServerMessage::ack(init.message_id));
    }

    async fn on_interrupt(&mut self, chat: ChatMessage) {
        let task_id = self.cancel_current("interrupted").await;
        info!("◆ SESSION {} SUSPENDED", self.session_id);

        self.publish(
            Event::new(EventKind::TaskSuspended)
                .with_payload("message_id", &chat.message_id)
                .with_payload("task_id", task_id),
        )
        .await;
        self.outbound.send(ServerMessage::event(
            EventKind::TaskSuspended,
            Some(chat.message_id),
            task_id,
            Value::Object(Default::default()),
        ));
    }

    async fn on_protocol_error(&mut self, err: &ProtocolError) {
        warn!("◆ PROTOCOL ERROR on session {}: {}", self.session_id, err);
        self.publish(Event::new(EventKind::Error).with_payload("error", err.to_string()))
            .await;
        self.outbound.send(ServerMessage::error(SERVICE_EXCEPTION, None));
    }

    async fn on_chat(&mut self, chat: ChatMessage) {
        self.cancel_current("superseded").await;

        let task_id = match self.manager.ids.next_id().await {
            Ok(id) => id,
            Err(e) => {
                error!("Cannot issue task id: {}", e);
                self.publish(Event::new(EventKind::Error).with_payload("error", e.to_string()))
                    .await;
                self.outbound
                    .send(ServerMessage::error(SERVICE_EXCEPTION, Some(chat.message_id)));
                return;
            }
        };

        let prior = {
            let mut history = self.history.lock().await;
            if chat.context_type == ContextType::Normal {
                history.clear();
            }
            let prior = history.messages().to_vec();
            history.push(Message::user(chat.prompt.clone()));
            prior
        };

        self.outbound.send(ServerMessage::ack(chat.message_id.clone()));

        let cancel = CancellationToken::new();
        let ctx = TaskContext {
            task_id,
            session_id: self.session_id.clone(),
            message_id: chat.message_id.clone(),
            cancel: cancel.clone(),
            bus: self.manager.bus.clone(),
            outbound: self.outbound.clone(),
        };
        let request = TaskRequest {
            task_id,
            session_id: self.session_id.clone(),
            message_id: chat.message_id,
            prompt: chat.prompt,
            attachments: chat.attachments,
            task_mode: chat.task_mode,
            context_type: chat.context_type,
            history: prior,
        };

        info!("◆ TASK {} START on session {}", task_id, self.session_id);
        let handle = tokio::spawn(run_task(
            self.manager.runner.clone(),
            request,
            ctx,
            self.history.clone(),
        ));
        self.current = Some(RunningTask {
            task_id,
            cancel,
            handle,
        });
    }

    /// Cancel the current task and wait for it to unwind.
    ///
    /// Returns the id of a task that was still running.
    async fn cancel_current(&mut self, reason: &str) -> Option<u64> {
        let task = self.current.take()?;
        let was_running = !task.handle.is_finished();

        task.cancel.cancel();
        match task.handle.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => error!("Task {} panicked: {}", task.task_id, e),
            Err(e) => debug!("Task {} join: {}", task.task_id, e),
        }

        if was_running {
            info!("◆ TASK {} CANCELLED ({})", task.task_id, reason);
            Some(task.task_id)
        } else {
            None
        }
    }
}

async fn run_task(
    runner: Arc<dyn TaskRunner>,
    request: TaskRequest,
    ctx: TaskContext,
    history: Arc<Mutex<History>>,
) {
    let task_id = ctx.task_id;
    ctx.publish(Event::new(EventKind::TaskStarted).with_payload("task_id", task_id))
        .await;
    ctx.notify(EventKind::TaskStarted, json!({}));

    let cancel = ctx.cancel.clone();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = AssertUnwindSafe(runner.run(request, ctx.clone())).catch_unwind() => {
            Some(result.unwrap_or_else(|panic| {
                Err(format!("task panicked: {}", panic_message(&*panic)).into())
            }))
        }
    };

    match result {
        None => debug!("Task {} unwound after cancellation", task_id),
        Some(Ok(outcome)) => {
            history.lock().await.extend(outcome.transcript);
            info!("◆ TASK {} FINISHED", task_id);
            ctx.publish(
                Event::new(EventKind::TaskFinished)
                    .with_payload("task_id", task_id)
                    .with_payload("reply", &outcome.reply),
            )
            .await;
            ctx.notify(EventKind::TaskFinished, json!({ "reply": outcome.reply }));
        }
        Some(Err(e)) => {
            error!("◆ TASK {} FAILED: {}", task_id, e);
            ctx.publish(
                Event::new(EventKind::TaskFailed)
                    .with_payload("task_id", task_id)
                    .with_payload("error", e.to_string()),
            )
            .await;
            ctx.notify(EventKind::TaskFailed, json!({ "error": SERVICE_EXCEPTION }));
        }
    }
}
