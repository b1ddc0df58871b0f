//! What a supervised worker runs

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// In-process worker body; it should return once the token is cancelled
pub type TaskFn = Arc<dyn Fn(CancellationToken) -> TaskFuture + Send + Sync>;

/// External command to launch
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Directory receiving `<name>.log` with stdout and stderr; discarded if unset
    pub log_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn log_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

/// Entry point of a supervised worker
#[derive(Clone)]
pub enum Entrypoint {
    Command(CommandSpec),
    Task(TaskFn),
}

impl Entrypoint {
    pub fn command(spec: CommandSpec) -> Self {
        Entrypoint::Command(spec)
    }

    pub fn task<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Entrypoint::Task(Arc::new(move |token| Box::pin(f(token))))
    }
}

impl std::fmt::Debug for Entrypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entrypoint::Command(spec) => f.debug_tuple("Command").field(spec).finish(),
            Entrypoint::Task(_) => f.write_str("Task"),
        }
    }
}
