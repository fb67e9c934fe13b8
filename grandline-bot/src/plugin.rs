//! Plugin lifecycle and event dispatch.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use grandline_core::store::Backend;
use grandline_core::world::{Directory, Sweeper};
use grandline_core::{GrandlineConfig, GrandlineError, RecordStore, Result};

use crate::commands::{self, Command};
use crate::context::GameContext;
use crate::directory::PresenceDirectory;
use crate::events::{BotEvent, CommandInvocation};
use crate::messages::{MessageSink, OutgoingMessage};
use crate::scheduler::SweepScheduler;

/// Chat text for a failed command. Internal details stay in the logs.
#[must_use]
pub fn describe_error(err: &GrandlineError) -> String {
    match err {
        GrandlineError::InvalidArgument(msg) => msg.clone(),
        GrandlineError::Cooldown { remaining_secs } => format!(
            "Still catching your breath. Try again in {}m {}s.",
            remaining_secs / 60,
            remaining_secs % 60
        ),
        GrandlineError::NotFound { kind, .. } => format!("That {kind} is nowhere to be found."),
        _ => "Rough seas, something went wrong. Nothing was changed, try again shortly.".to_string(),
    }
}

/// A loaded plugin instance.
#[derive(Debug)]
pub struct GrandlinePlugin {
    ctx: Arc<GameContext>,
    scheduler: Option<SweepScheduler>,
}

impl GrandlinePlugin {
    /// Load on the current tokio runtime: build the store, the registries
    /// and, if enabled, start the sweep scheduler.
    ///
    /// # Errors
    /// `Config` if the configuration fails validation.
    pub fn load(
        config: GrandlineConfig,
        backend: Arc<dyn Backend>,
        sink: mpsc::Sender<OutgoingMessage>,
    ) -> Result<Self> {
        Self::load_with_rng(config, backend, sink, StdRng::from_entropy())
    }

    /// Like [`load`](Self::load) with a caller-supplied RNG for command
    /// rolls.
    ///
    /// # Errors
    /// See [`load`](Self::load).
    pub fn load_with_rng(
        config: GrandlineConfig,
        backend: Arc<dyn Backend>,
        sink: mpsc::Sender<OutgoingMessage>,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        let store = RecordStore::new(backend, config.defaults.clone());
        let directory = Arc::new(PresenceDirectory::new());
        let ctx = Arc::new(GameContext::new(
            store.clone(),
            config,
            MessageSink::new(sink),
            Arc::clone(&directory),
            rng,
        ));

        let scheduler = if ctx.config.sweeps.enabled {
            let sweep_directory: Arc<dyn Directory> = directory;
            let sweeper = Sweeper::new(store, sweep_directory, ctx.config.sweeps.clone());
            Some(SweepScheduler::start(&sweeper))
        } else {
            None
        };
        info!(sweeps = scheduler.is_some(), "grandline plugin loaded");
        Ok(Self { ctx, scheduler })
    }

    /// Shared command context.
    #[must_use]
    pub fn context(&self) -> &Arc<GameContext> {
        &self.ctx
    }

    /// Handle one event to completion.
    pub async fn handle_event(&self, event: BotEvent) {
        handle(Arc::clone(&self.ctx), event).await;
    }

    /// Handle one event on its own task, so a command waiting on a prompt
    /// never holds up the next event.
    pub fn dispatch(&self, event: BotEvent) -> JoinHandle<()> {
        tokio::spawn(handle(Arc::clone(&self.ctx), event))
    }

    /// Stop the sweeps and clear every registry.
    pub async fn unload(self) {
        if let Some(scheduler) = self.scheduler {
            scheduler.stop().await;
        }
        self.ctx.clear_sessions();
        self.ctx.directory.clear();
        if let Err(e) = self.ctx.store.checkpoint() {
            error!(error = %e, "checkpoint on unload failed");
        }
        info!("grandline plugin unloaded");
    }
}

async fn handle(ctx: Arc<GameContext>, event: BotEvent) {
    if ctx.directory.observe(&event) {
        return;
    }
    match event {
        BotEvent::Command(inv) => run_command(&ctx, &inv).await,
        BotEvent::Message {
            channel, author, text, ..
        } => {
            if ctx.prompts.deliver(channel, author, &text) {
                debug!(channel = %channel, author = %author, "prompt answered");
            }
        }
        BotEvent::MemberJoined { .. } | BotEvent::MemberLeft { .. } | BotEvent::GuildRemoved { .. } => {}
    }
}

async fn run_command(ctx: &GameContext, inv: &CommandInvocation) {
    let result = match Command::parse(inv) {
        Ok(command) => commands::execute(ctx, inv, command).await,
        Err(e) => Err(e),
    };
    let Err(err) = result else {
        return;
    };

    if err.is_user_facing() {
        debug!(command = %inv.name, error = %err, "command refused");
    } else if err.is_transient() {
        warn!(command = %inv.name, error = %err, "command failed");
    } else {
        error!(command = %inv.name, error = %err, "command failed");
    }
    if let Err(e) = ctx.sink.text(inv.channel, describe_error(&err)).await {
        warn!(error = %e, "could not report command failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use grandline_core::store::{MemoryBackend, StoredRecord, WriteOp};
    use grandline_core::{RecordKey, Scope};

    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        checkpoints: AtomicUsize,
    }

    impl Backend for CountingBackend {
        fn load(&self, key: &RecordKey) -> Result<Option<StoredRecord>> {
            self.inner.load(key)
        }
        fn save_batch(&self, ops: &[WriteOp]) -> Result<Vec<u64>> {
            self.inner.save_batch(ops)
        }
        fn delete(&self, key: &RecordKey) -> Result<bool> {
            self.inner.delete(key)
        }
        fn list_keys(&self, scope: Scope) -> Result<Vec<RecordKey>> {
            self.inner.list_keys(scope)
        }
        fn checkpoint(&self) -> Result<()> {
            self.checkpoints.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn unload_checkpoints_the_store() {
        let backend = Arc::new(CountingBackend::default());
        let (tx, _rx) = mpsc::channel(8);
        let mut config = GrandlineConfig::default();
        config.sweeps.enabled = false;
        let plugin = GrandlinePlugin::load(config, backend.clone(), tx).expect("load");

        plugin.unload().await;
        assert_eq!(backend.checkpoints.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn internal_errors_stay_generic() {
        let msg = describe_error(&GrandlineError::TransientIo("disk on fire".into()));
        assert!(!msg.contains("disk"));
        assert_eq!(
            describe_error(&GrandlineError::Cooldown { remaining_secs: 125 }),
            "Still catching your breath. Try again in 2m 5s."
        );
        assert_eq!(
            describe_error(&GrandlineError::not_found("member", 3)),
            "That member is nowhere to be found."
        );
    }
}
