//! Background scheduler: a recurring, non-overlapping sweep that drives
//! active conversations forward.
//!
//! Each tick lists the active conversations and advances those whose last
//! processed step is older than the configured minimum interval, one
//! generation-driver step each. The loop body awaits every sweep to
//! completion and the interval is configured to skip missed ticks, so a
//! sweep that is still running is never re-entered — the next tick is simply
//! skipped. Every per-conversation advance is independently guarded: a
//! failure is logged and the remaining conversations in the sweep are still
//! attempted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::colloquy::generation::{GenerationDriver, StepOutcome};
use crate::colloquy::lifecycle::ConversationManager;

/// Timing knobs for the scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// How often the sweep runs.
    pub sweep_interval: Duration,
    /// Minimum time between two generation steps of the same conversation.
    pub min_advance_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            min_advance_interval: Duration::from_secs(5),
        }
    }
}

/// Periodic driver over all active conversations.
///
/// Per-conversation last-advance times live inside the run loop, so stopping
/// the scheduler drops them; a restarted scheduler begins with a clean
/// table and never shares state with another instance.
pub struct ConversationScheduler {
    manager: Arc<ConversationManager>,
    driver: Arc<GenerationDriver>,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
}

impl ConversationScheduler {
    pub fn new(
        manager: Arc<ConversationManager>,
        driver: Arc<GenerationDriver>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            manager,
            driver,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Handle that can be used to request shutdown from elsewhere.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Spawn the sweep loop. Returns the task handle; pass it to
    /// [`stop`](ConversationScheduler::stop) for a clean shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Cancel the loop and await the task. An already-started sweep (and any
    /// driver call inside it) runs to natural completion first.
    pub async fn stop(&self, handle: tokio::task::JoinHandle<()>) {
        self.shutdown_token.cancel();
        if let Err(err) = handle.await {
            log::error!("Scheduler task ended abnormally: {}", err);
        }
    }

    async fn run(&self) {
        log::info!(
            "Starting conversation scheduler (sweep every {:?}, min advance interval {:?})",
            self.config.sweep_interval,
            self.config.min_advance_interval
        );

        let mut tick = interval(self.config.sweep_interval);
        // A sweep still in flight must never be re-entered; skip the backlog.
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Scheduler-owned, dropped on stop.
        let mut last_advance: HashMap<Uuid, Instant> = HashMap::new();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sweep(&mut last_advance).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    log::info!("Shutdown signal received, stopping conversation scheduler");
                    break;
                }
            }
        }
    }

    /// One execution of the periodic tick over all active conversations.
    async fn sweep(&self, last_advance: &mut HashMap<Uuid, Instant>) {
        if !self.driver.status().enabled {
            log::debug!("Generation driver disabled, skipping sweep");
            return;
        }

        let conversations = match self.manager.list_active().await {
            Ok(conversations) => conversations,
            Err(err) => {
                log::warn!("Sweep could not list active conversations: {}", err);
                return;
            }
        };

        // Drop rate-limit entries for conversations that left the active set.
        last_advance.retain(|id, _| conversations.iter().any(|c| &c.id == id));

        let now = Instant::now();
        for conversation in conversations {
            if let Some(last) = last_advance.get(&conversation.id) {
                if now.duration_since(*last) < self.config.min_advance_interval {
                    continue;
                }
            }
            last_advance.insert(conversation.id, now);

            match self.driver.step(conversation.id).await {
                Ok(StepOutcome::GoalReached) => {
                    last_advance.remove(&conversation.id);
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!(
                        "Sweep: advancing conversation '{}' failed: {}",
                        conversation.name,
                        err
                    );
                }
            }
        }
    }
}
