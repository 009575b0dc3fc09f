//! Bonnet handle - wiring and lifecycle of the acquisition engine
//!
//! Builds the shared store and pin map from the configuration and starts the three
//! execution contexts: the GPIO edge task, the analog poll thread (sole owner of the
//! ADC bus) and the publish task. All of them stop on one cancellation token.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::axis_discretizer::AnalogPoller;
use super::edge_monitor::DigitalEdgeMonitor;
use super::facade::ControllerFacade;
use super::input_state::InputStateStore;
use super::transition::InputRouter;
use crate::config::{BonnetConfig, ConfigError};
use crate::hw::ads1015::AnalogChannelReader;
use crate::hw::{BusError, GpioCapability, GpioError, RegisterBus};
use crate::mapping::{KeySink, SinkError};
use crate::mqtt::publisher::{spawn_publisher, PublishScheduler, PublishSink, PublishStats};

/// Startup and shutdown failures of the bonnet
#[derive(Debug, thiserror::Error)]
pub enum BonnetError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("GPIO error: {0}")]
    GpioError(#[from] GpioError),

    #[error("I2C error: {0}")]
    BusError(#[from] BusError),

    #[error("Sink error: {0}")]
    SinkError(#[from] SinkError),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Running acquisition engine
///
/// Dropping the handle without calling [`BonnetHandle::shutdown`] leaves the tasks
/// running until the token is cancelled elsewhere.
pub struct BonnetHandle<B: RegisterBus + 'static> {
    shutdown: CancellationToken,
    store: Arc<InputStateStore>,
    edge_task: JoinHandle<()>,
    publish_task: JoinHandle<PublishStats>,
    poll_thread: std::thread::JoinHandle<AnalogChannelReader<B>>,
}

impl<B: RegisterBus + 'static> BonnetHandle<B> {
    pub fn spawn(
        config: &BonnetConfig,
        gpio: Arc<dyn GpioCapability>,
        bus: B,
        key_sink: Arc<dyn KeySink>,
        publish_sink: Arc<dyn PublishSink>,
        shutdown: CancellationToken,
    ) -> Result<Self, BonnetError> {
        info!("Initializing bonnet input engine");
        config.validate()?;

        let store = Arc::new(InputStateStore::new());
        let pins = Arc::new(config.pin_map()?);
        debug!("Pin map with {} entries", pins.len());

        let facade = config
            .publish
            .include_drive
            .then(|| ControllerFacade::new(config.drive.clone()));

        let mut router = InputRouter::new(
            store.clone(),
            pins,
            config.keyboard.codes.clone(),
            key_sink,
        );
        if let Some(facade) = &facade {
            router = router.with_toggles(facade.toggles());
        }

        let mut monitor =
            DigitalEdgeMonitor::new(gpio, router.clone(), Some(config.edge_settings()));
        monitor.register_all()?;

        let reader = AnalogChannelReader::new(bus, config.conversion_timeout());
        let poller = AnalogPoller::new(reader, router, config.axis_settings()?);

        let scheduler = PublishScheduler::create(
            store.clone(),
            publish_sink,
            facade,
            Some(config.publish_settings()),
        );

        let poll_thread = poller
            .spawn(shutdown.clone())
            .map_err(|e| BonnetError::ThreadError(e.to_string()))?;
        let edge_task = monitor.spawn(shutdown.clone());
        let publish_task = spawn_publisher(scheduler, shutdown.clone());

        info!("Bonnet input engine running");
        Ok(Self {
            shutdown,
            store,
            edge_task,
            publish_task,
            poll_thread,
        })
    }

    pub fn store(&self) -> &Arc<InputStateStore> {
        &self.store
    }

    /// Stop every context, release the ADC bus and return the publish totals
    pub async fn shutdown(self) -> Result<PublishStats, BonnetError> {
        info!("Shutting down bonnet input engine");
        self.shutdown.cancel();

        if let Err(e) = self.edge_task.await {
            error!("Edge task ended abnormally: {}", e);
        }
        let stats = self
            .publish_task
            .await
            .map_err(|e| BonnetError::ThreadError(format!("publish task: {}", e)))?;

        let poll_thread = self.poll_thread;
        let reader = tokio::task::spawn_blocking(move || poll_thread.join())
            .await
            .map_err(|e| BonnetError::ThreadError(format!("poll join: {}", e)))?
            .map_err(|_| BonnetError::ThreadError("analog poll thread panicked".to_string()))?;

        // Releasing the bus closes the I2C handle
        drop(reader.into_inner());

        info!("Bonnet input engine stopped");
        Ok(stats)
    }
}
