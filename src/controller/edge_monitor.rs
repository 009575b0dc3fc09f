use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::input_state::LogicalButton;
use super::pin_map::PinId;
use super::transition::{InputRouter, TransitionOutcome};
use crate::hw::{EdgeEvent, GpioCapability, GpioError, Level};

// Edge monitor settings
#[derive(Clone, Debug)]
pub struct EdgeMonitorSettings {
    pub debounce: Duration,
}

impl Default for EdgeMonitorSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(10),
        }
    }
}

// Debounced GPIO edge handling for the physical buttons
pub struct DigitalEdgeMonitor {
    gpio: Arc<dyn GpioCapability>,
    router: InputRouter,
    settings: EdgeMonitorSettings,
    registered: Vec<(u8, LogicalButton)>,
    edge_sender: Option<mpsc::UnboundedSender<EdgeEvent>>,
    edge_receiver: mpsc::UnboundedReceiver<EdgeEvent>,
}

impl DigitalEdgeMonitor {
    pub fn new(
        gpio: Arc<dyn GpioCapability>,
        router: InputRouter,
        settings: Option<EdgeMonitorSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        debug!("Creating edge monitor with settings: {:?}", settings);
        let (edge_sender, edge_receiver) = mpsc::unbounded_channel();
        Self {
            gpio,
            router,
            settings,
            registered: Vec::new(),
            edge_sender: Some(edge_sender),
            edge_receiver,
        }
    }

    /// Configure `pin` as pulled-up input and route its edges to `button`
    pub fn register(&mut self, pin: u8, button: LogicalButton) -> Result<(), GpioError> {
        let Some(edges) = self.edge_sender.as_ref() else {
            return Err(GpioError::PinSetup {
                pin,
                reason: "edge monitor already running".to_string(),
            });
        };
        self.gpio.configure_input_pullup(pin)?;
        self.gpio.subscribe_edges(pin, edges.clone())?;
        self.registered.push((pin, button));
        info!("Registered pin {} as button {}", pin, button);
        Ok(())
    }

    /// Register every physical pin of the router's pin map
    pub fn register_all(&mut self) -> Result<(), GpioError> {
        let pins = self.router.pins().gpio_pins();
        for (pin, button) in pins {
            self.register(pin, button)?;
        }
        Ok(())
    }

    pub fn registered(&self) -> &[(u8, LogicalButton)] {
        &self.registered
    }

    /// Debounce one edge and apply the settled level
    pub async fn handle_edge(&self, event: EdgeEvent) -> TransitionOutcome {
        let pin = PinId::gpio(event.pin);
        if self.router.pins().button_for(pin).is_none() {
            debug!("Edge on unmapped pin {} ignored", event.pin);
            return TransitionOutcome::Ignored;
        }

        tokio::time::sleep(self.settings.debounce).await;

        let level = match self.gpio.read_level(event.pin) {
            Ok(level) => level,
            Err(e) => {
                warn!(
                    "Settled level of pin {} unreadable ({}), using edge level {:?}",
                    event.pin, e, event.level
                );
                event.level
            }
        };

        // Buttons pull the line to ground
        self.router.apply(pin, level == Level::Low)
    }

    /// Handle edges until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Edge monitor running on {} pins, debounce {:?}",
            self.registered.len(),
            self.settings.debounce
        );

        // The channel closes once the GPIO side drops its senders
        self.edge_sender.take();

        let mut handled: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Edge monitor stopping after {} edges", handled);
                    break;
                }
                edge = self.edge_receiver.recv() => {
                    match edge {
                        Some(event) => {
                            debug!("Edge on pin {} ({:?})", event.pin, event.level);
                            self.handle_edge(event).await;
                            handled += 1;
                        }
                        None => {
                            error!("Edge channel closed, no more GPIO events");
                            break;
                        }
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::controller::transition::tests::router_with;
    use crate::mapping::keyboard::tests::RecordingKeySink;
    use crate::mapping::keyboard::KEY_LEFTCTRL;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// GPIO fake: levels are set by the test, edges are kept for manual firing
    #[derive(Default)]
    pub(crate) struct FakeGpio {
        pub levels: Mutex<HashMap<u8, Level>>,
        pub configured: Mutex<Vec<u8>>,
        pub subscribers: Mutex<HashMap<u8, mpsc::UnboundedSender<EdgeEvent>>>,
    }

    impl FakeGpio {
        pub(crate) fn set_level(&self, pin: u8, level: Level) {
            self.levels.lock().unwrap().insert(pin, level);
        }

        /// Change the line level and raise the edge like an interrupt would
        pub(crate) fn drive(&self, pin: u8, level: Level) {
            self.set_level(pin, level);
            if let Some(sender) = self.subscribers.lock().unwrap().get(&pin) {
                sender.send(EdgeEvent { pin, level }).unwrap();
            }
        }
    }

    impl GpioCapability for FakeGpio {
        fn configure_input_pullup(&self, pin: u8) -> Result<(), GpioError> {
            self.configured.lock().unwrap().push(pin);
            self.set_level(pin, Level::High);
            Ok(())
        }

        fn subscribe_edges(
            &self,
            pin: u8,
            edges: mpsc::UnboundedSender<EdgeEvent>,
        ) -> Result<(), GpioError> {
            self.subscribers.lock().unwrap().insert(pin, edges);
            Ok(())
        }

        fn read_level(&self, pin: u8) -> Result<Level, GpioError> {
            self.levels
                .lock()
                .unwrap()
                .get(&pin)
                .copied()
                .ok_or(GpioError::UnknownPin(pin))
        }
    }

    fn monitor(gpio: Arc<FakeGpio>, sink: Arc<RecordingKeySink>) -> DigitalEdgeMonitor {
        let mut monitor = DigitalEdgeMonitor::new(gpio, router_with(sink), None);
        monitor.register_all().unwrap();
        monitor
    }

    #[tokio::test(start_paused = true)]
    async fn press_on_pin_12_reaches_store_and_keyboard() {
        let gpio = Arc::new(FakeGpio::default());
        let sink = Arc::new(RecordingKeySink::default());
        let monitor = monitor(gpio.clone(), sink.clone());
        let store = monitor.router.store().clone();

        gpio.set_level(12, Level::Low);
        let started = tokio::time::Instant::now();
        let outcome = monitor
            .handle_edge(EdgeEvent {
                pin: 12,
                level: Level::Low,
            })
            .await;

        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                button: LogicalButton::A,
                pressed: true,
                changed: true
            }
        );
        assert!(store.snapshot().a);
        assert_eq!(sink.events(), vec![(KEY_LEFTCTRL, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_level_wins_over_edge_level() {
        let gpio = Arc::new(FakeGpio::default());
        let sink = Arc::new(RecordingKeySink::default());
        let monitor = monitor(gpio.clone(), sink.clone());

        // Bounce: the edge said low, the line is back high after the window
        gpio.set_level(12, Level::High);
        monitor
            .handle_edge(EdgeEvent {
                pin: 12,
                level: Level::Low,
            })
            .await;

        assert!(!monitor.router.store().snapshot().a);
        assert_eq!(sink.events(), vec![(KEY_LEFTCTRL, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn edge_on_unregistered_pin_changes_nothing() {
        let gpio = Arc::new(FakeGpio::default());
        let sink = Arc::new(RecordingKeySink::default());
        let monitor = monitor(gpio.clone(), sink.clone());

        let outcome = monitor
            .handle_edge(EdgeEvent {
                pin: 4,
                level: Level::Low,
            })
            .await;

        assert_eq!(outcome, TransitionOutcome::Ignored);
        assert_eq!(monitor.router.store().snapshot().pressed_count(), 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn running_monitor_applies_each_edge_once() {
        let gpio = Arc::new(FakeGpio::default());
        let sink = Arc::new(RecordingKeySink::default());
        let monitor = monitor(gpio.clone(), sink.clone());
        let store = monitor.router.store().clone();
        assert_eq!(*gpio.configured.lock().unwrap(), vec![6, 12, 20, 26]);

        let shutdown = CancellationToken::new();
        let task = monitor.spawn(shutdown.clone());

        gpio.drive(26, Level::Low);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.snapshot().start);

        gpio.drive(26, Level::High);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.snapshot().start);

        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(sink.events().len(), 2);
    }
}
