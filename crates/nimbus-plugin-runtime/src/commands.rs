//! Command registry.
//!
//! Maps fully qualified command keys (`<plugin>.<name>`) to handlers. A key
//! can be held by one registration at a time.

use async_trait::async_trait;
use nimbus_core::{BoxFuture, CommandId, Disposable, NimbusError, NimbusResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Something that can run when a command is executed.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> NimbusResult<Value>;
}

struct SyncHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for SyncHandler<F>
where
    F: Fn(Vec<Value>) -> NimbusResult<Value> + Send + Sync,
{
    async fn call(&self, args: Vec<Value>) -> NimbusResult<Value> {
        (self.0)(args)
    }
}

struct AsyncHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for AsyncHandler<F>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Value> + Send + Sync,
{
    async fn call(&self, args: Vec<Value>) -> NimbusResult<Value> {
        (self.0)(args).await
    }
}

/// Wraps a synchronous closure so it satisfies the async handler contract.
pub fn sync_handler<F>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Vec<Value>) -> NimbusResult<Value> + Send + Sync + 'static,
{
    Arc::new(SyncHandler(f))
}

/// Wraps a closure returning a future.
pub fn async_handler<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = NimbusResult<Value>> + Send + 'static,
{
    Arc::new(AsyncHandler(move |args| -> BoxFuture<'static, Value> { Box::pin(f(args)) }))
}

struct Registration {
    id: CommandId,
    handler: Arc<dyn CommandHandler>,
    token: u64,
}

/// Registry of executable commands. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Arc<RwLock<HashMap<String, Registration>>>,
    next_token: Arc<AtomicU64>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`.
    ///
    /// Fails with [`NimbusError::Conflict`] if the key is already taken. The
    /// returned disposable removes this registration only.
    pub fn register(&self, id: CommandId, handler: Arc<dyn CommandHandler>) -> NimbusResult<Disposable> {
        let key = id.qualified();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        {
            let mut commands = self.commands.write();
            if commands.contains_key(&key) {
                warn!(command = %key, plugin_id = %id.plugin_id(), "Command already registered");
                return Err(NimbusError::conflict(format!("command {key} is already registered")));
            }
            commands.insert(key.clone(), Registration { id, handler, token });
        }
        debug!(command = %key, "Command registered");

        let commands = Arc::clone(&self.commands);
        Ok(Disposable::new(move || {
            let mut commands = commands.write();
            if commands.get(&key).is_some_and(|r| r.token == token) {
                commands.remove(&key);
                debug!(command = %key, "Command disposed");
            }
        }))
    }

    /// Runs the handler registered under the qualified key `command`.
    pub async fn execute(&self, command: &str, args: Vec<Value>) -> NimbusResult<Value> {
        let handler = self
            .commands
            .read()
            .get(command)
            .map(|r| Arc::clone(&r.handler))
            .ok_or_else(|| NimbusError::CommandNotFound(command.to_string()))?;

        debug!(command = %command, args = args.len(), "Executing command");
        handler.call(args).await
    }

    #[must_use]
    pub fn has_command(&self, command: &str) -> bool {
        self.commands.read().contains_key(command)
    }

    /// Lists qualified keys, sorted.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.commands.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Lists the commands owned by `plugin_id`.
    #[must_use]
    pub fn commands_of(&self, plugin_id: &str) -> Vec<CommandId> {
        let mut ids: Vec<CommandId> = self
            .commands
            .read()
            .values()
            .filter(|r| r.id.plugin_id().as_str() == plugin_id)
            .map(|r| r.id.clone())
            .collect();
        ids.sort_by_key(CommandId::qualified);
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}
