use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::message::StatePayload;
use crate::controller::facade::ControllerFacade;
use crate::controller::input_state::{InputSnapshot, InputStateStore};
use crate::mapping::SinkError;

pub const DEFAULT_TOPIC: &str = "real/agent/loader/joystick/json";

/// Accepts a serialized payload on a topic
///
/// Implementations must not block; a full outgoing queue is reported as
/// [`SinkError::QueueFull`].
pub trait PublishSink: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError>;
}

// Publisher settings
#[derive(Clone, Debug)]
pub struct PublishSettings {
    pub interval: Duration,
    pub topic: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub published: u64,
    pub failed: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum SchedulerState {
    Idle,
    Waiting,
    Publishing(InputSnapshot),
}

#[machine]
pub struct PublishScheduler<S: SchedulerState> {
    store: Arc<InputStateStore>,
    sink: Arc<dyn PublishSink>,
    facade: Option<ControllerFacade>,
    settings: PublishSettings,
    stats: PublishStats,
}

/// Result of waiting for the next firing
pub enum Tick {
    Due(PublishScheduler<Publishing>),
    Stopped(PublishScheduler<Waiting>),
}

impl<S: SchedulerState> PublishScheduler<S> {
    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }
}

impl PublishScheduler<Idle> {
    pub fn create(
        store: Arc<InputStateStore>,
        sink: Arc<dyn PublishSink>,
        facade: Option<ControllerFacade>,
        settings: Option<PublishSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        info!("Creating publish scheduler with settings: {:?}", settings);
        Self::new(store, sink, facade, settings, PublishStats::default())
    }

    pub fn schedule(self) -> PublishScheduler<Waiting> {
        debug!("Publish scheduled every {:?}", self.settings.interval);
        self.transition()
    }
}

impl PublishScheduler<Waiting> {
    /// Sleep one interval, then capture the snapshot to publish
    pub async fn fire(self, shutdown: &CancellationToken) -> Tick {
        let interval = self.settings.interval;
        tokio::select! {
            _ = shutdown.cancelled() => Tick::Stopped(self),
            _ = tokio::time::sleep(interval) => {
                let snapshot = self.store.snapshot();
                Tick::Due(self.transition_with(snapshot))
            }
        }
    }
}

impl PublishScheduler<Publishing> {
    /// Serialize and submit the captured snapshot, failures are logged and counted
    pub fn publish(mut self) -> PublishScheduler<Waiting> {
        let snapshot = match self.get_state_data() {
            Some(snapshot) => *snapshot,
            None => {
                warn!("No snapshot in publishing state, taking a fresh one");
                self.store.snapshot()
            }
        };

        let drive = self.facade.as_ref().map(|facade| facade.update(&snapshot));
        let result = StatePayload::new(snapshot, drive)
            .to_json()
            .and_then(|payload| self.sink.publish(&self.settings.topic, payload));

        match result {
            Ok(()) => {
                debug!(
                    "Published {} pressed buttons to {}",
                    snapshot.pressed_count(),
                    self.settings.topic
                );
                self.stats.published += 1;
            }
            Err(e) => {
                error!("Publish to {} failed: {}", self.settings.topic, e);
                self.stats.failed += 1;
            }
        }

        self.transition()
    }
}

/// Publish until `shutdown` is cancelled and return the totals
pub async fn run_publish_loop(
    scheduler: PublishScheduler<Idle>,
    shutdown: CancellationToken,
) -> PublishStats {
    let mut waiting = scheduler.schedule();

    let mut last_stats_time = Local::now();
    let mut window_start = waiting.stats();
    let stats_interval = chrono::Duration::seconds(60);

    loop {
        waiting = match waiting.fire(&shutdown).await {
            Tick::Due(publishing) => publishing.publish(),
            Tick::Stopped(waiting) => {
                let stats = waiting.stats();
                info!(
                    "Publish scheduler stopped: {} published, {} failed",
                    stats.published, stats.failed
                );
                return stats;
            }
        };

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let stats = waiting.stats();
            info!(
                "Publish stats: {} published, {} failed in {} seconds",
                stats.published - window_start.published,
                stats.failed - window_start.failed,
                (now - last_stats_time).num_seconds()
            );
            window_start = stats;
            last_stats_time = now;
        }
    }
}

pub fn spawn_publisher(
    scheduler: PublishScheduler<Idle>,
    shutdown: CancellationToken,
) -> JoinHandle<PublishStats> {
    info!("Spawning publish scheduler task");
    tokio::spawn(run_publish_loop(scheduler, shutdown))
}
