//! Single entry point for logical button transitions
//!
//! Both detectors end up here. The router resolves the pin, mirrors real pins to the
//! key sink and writes the store. Synthetic analog pins only update the store. A
//! debounced press of select or start also flips the shared drive toggles.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::facade::DriveToggles;
use super::input_state::{InputStateStore, LogicalButton};
use super::pin_map::{PinId, PinMap};
use crate::mapping::{KeyMap, KeySink};

/// What a transition did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The pin is not mapped, nothing changed
    Ignored,
    /// The store now holds `pressed` for `button`
    Applied {
        button: LogicalButton,
        pressed: bool,
        changed: bool,
    },
}

/// Cheap to clone, every execution context holds its own copy
#[derive(Clone)]
pub struct InputRouter {
    store: Arc<InputStateStore>,
    pins: Arc<PinMap>,
    keys: Arc<KeyMap>,
    key_sink: Arc<dyn KeySink>,
    toggles: Option<Arc<DriveToggles>>,
}

impl InputRouter {
    pub fn new(
        store: Arc<InputStateStore>,
        pins: Arc<PinMap>,
        keys: KeyMap,
        key_sink: Arc<dyn KeySink>,
    ) -> Self {
        Self {
            store,
            pins,
            keys: Arc::new(keys),
            key_sink,
            toggles: None,
        }
    }

    /// Flip `toggles` on every released → pressed transition of select or start
    pub fn with_toggles(mut self, toggles: Arc<DriveToggles>) -> Self {
        self.toggles = Some(toggles);
        self
    }

    pub fn store(&self) -> &Arc<InputStateStore> {
        &self.store
    }

    pub fn pins(&self) -> &Arc<PinMap> {
        &self.pins
    }

    /// Apply a settled state for `pin`
    ///
    /// A failing key sink is logged, the store is updated regardless.
    pub fn apply(&self, pin: PinId, pressed: bool) -> TransitionOutcome {
        let Some(button) = self.pins.button_for(pin) else {
            debug!("Ignoring transition on unmapped pin {}", pin);
            return TransitionOutcome::Ignored;
        };

        if !pin.is_synthetic() {
            let code = self.keys.code_for(button);
            if let Err(e) = self.key_sink.emit(code, pressed) {
                warn!("Key event for {} (code {}) not delivered: {}", button, code, e);
            }
        }

        let previous = self.store.set_button(button, pressed);
        info!(
            "Pin: {}, Button: {}, Event: {}",
            pin,
            button,
            if pressed { "press" } else { "release" }
        );

        let changed = previous != pressed;
        if pressed && changed {
            if let Some(toggles) = &self.toggles {
                toggles.on_press(button);
            }
        }

        TransitionOutcome::Applied {
            button,
            pressed,
            changed,
        }
    }
}
