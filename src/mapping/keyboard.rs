//! Keyboard output for button transitions
//!
//! Physical button transitions are mirrored as key press/release events on a virtual
//! `uinput` keyboard. The code table is part of the configuration, the defaults follow
//! the classic retrogame layout (see `/usr/include/linux/input-event-codes.h`).

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::controller::input_state::LogicalButton;
use crate::mapping::SinkError;

/// Linux input key code
pub type KeyCode = u16;

pub const KEY_1: KeyCode = 2;
pub const KEY_2: KeyCode = 3;
pub const KEY_ENTER: KeyCode = 28;
pub const KEY_LEFTCTRL: KeyCode = 29;
pub const KEY_Z: KeyCode = 44;
pub const KEY_X: KeyCode = 45;
pub const KEY_LEFTALT: KeyCode = 56;
pub const KEY_SPACE: KeyCode = 57;
pub const KEY_UP: KeyCode = 103;
pub const KEY_LEFT: KeyCode = 105;
pub const KEY_RIGHT: KeyCode = 106;
pub const KEY_DOWN: KeyCode = 108;

/// LogicalButton → key code table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyMap {
    pub a: KeyCode,
    pub b: KeyCode,
    pub x: KeyCode,
    pub y: KeyCode,
    pub select: KeyCode,
    pub start: KeyCode,
    pub player1: KeyCode,
    pub player2: KeyCode,
    pub up: KeyCode,
    pub down: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            a: KEY_LEFTCTRL,
            b: KEY_LEFTALT,
            x: KEY_Z,
            y: KEY_X,
            select: KEY_SPACE,
            start: KEY_ENTER,
            player1: KEY_1,
            player2: KEY_2,
            up: KEY_UP,
            down: KEY_DOWN,
            left: KEY_LEFT,
            right: KEY_RIGHT,
        }
    }
}

impl KeyMap {
    pub fn code_for(&self, button: LogicalButton) -> KeyCode {
        match button {
            LogicalButton::A => self.a,
            LogicalButton::B => self.b,
            LogicalButton::X => self.x,
            LogicalButton::Y => self.y,
            LogicalButton::Select => self.select,
            LogicalButton::Start => self.start,
            LogicalButton::Player1 => self.player1,
            LogicalButton::Player2 => self.player2,
            LogicalButton::Up => self.up,
            LogicalButton::Down => self.down,
            LogicalButton::Left => self.left,
            LogicalButton::Right => self.right,
        }
    }

    pub fn all_codes(&self) -> Vec<KeyCode> {
        LogicalButton::ALL
            .iter()
            .map(|button| self.code_for(*button))
            .collect()
    }
}

/// Receiver of OS-level key events
pub trait KeySink: Send + Sync {
    fn emit(&self, code: KeyCode, pressed: bool) -> Result<(), SinkError>;
}

/// Virtual keyboard created through `/dev/uinput`
pub struct UinputKeySink {
    device: Mutex<VirtualDevice>,
}

impl UinputKeySink {
    /// Create the virtual device with every code of `keys` enabled
    ///
    /// Fails when `/dev/uinput` is missing or not writable, usually because the
    /// process is not running as root.
    pub fn create(name: &str, keys: &KeyMap) -> Result<Self, SinkError> {
        let mut supported = AttributeSet::<Key>::new();
        for code in keys.all_codes() {
            supported.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| {
                builder
                    .name(name)
                    .input_id(InputId::new(BusType::BUS_USB, 0, 0, 1))
                    .with_keys(&supported)
            })
            .and_then(|builder| builder.build())
            .map_err(|e| {
                SinkError::Initialization(format!(
                    "uinput device '{}' could not be created (running as root?): {}",
                    name, e
                ))
            })?;

        info!("Virtual keyboard '{}' created", name);
        Ok(Self {
            device: Mutex::new(device),
        })
    }
}

impl KeySink for UinputKeySink {
    fn emit(&self, code: KeyCode, pressed: bool) -> Result<(), SinkError> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| SinkError::Unavailable("virtual keyboard lock poisoned".to_string()))?;
        let event = InputEvent::new(EventType::KEY, code, i32::from(pressed));
        device
            .emit(&[event])
            .map_err(|e| SinkError::Unavailable(format!("key {} not written: {}", code, e)))
    }
}

impl Drop for UinputKeySink {
    fn drop(&mut self) {
        info!("Virtual keyboard closed");
    }
}

/// Key sink that only logs, for hosts without uinput access
#[derive(Debug, Default)]
pub struct LogKeySink;

impl KeySink for LogKeySink {
    fn emit(&self, code: KeyCode, pressed: bool) -> Result<(), SinkError> {
        debug!(
            "Key {} {}",
            code,
            if pressed { "press" } else { "release" }
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every emitted key, optionally failing all of them
    #[derive(Default)]
    pub(crate) struct RecordingKeySink {
        pub events: Mutex<Vec<(KeyCode, bool)>>,
        pub fail: bool,
    }

    impl RecordingKeySink {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn events(&self) -> Vec<(KeyCode, bool)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl KeySink for RecordingKeySink {
        fn emit(&self, code: KeyCode, pressed: bool) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Unavailable("device unplugged".to_string()));
            }
            self.events.lock().unwrap().push((code, pressed));
            Ok(())
        }
    }

    #[test]
    fn default_table_follows_retrogame_layout() {
        let keys = KeyMap::default();
        assert_eq!(keys.code_for(LogicalButton::A), KEY_LEFTCTRL);
        assert_eq!(keys.code_for(LogicalButton::Start), KEY_ENTER);
        assert_eq!(keys.code_for(LogicalButton::Right), KEY_RIGHT);
        assert_eq!(keys.all_codes().len(), 12);
    }

    #[test]
    fn partial_table_keeps_defaults_for_missing_entries() {
        let keys: KeyMap = toml::from_str("a = 30\nselect = 1").unwrap();
        assert_eq!(keys.a, 30);
        assert_eq!(keys.select, 1);
        assert_eq!(keys.b, KEY_LEFTALT);
    }

    #[test]
    fn log_sink_never_fails() {
        assert!(LogKeySink.emit(KEY_Z, true).is_ok());
    }
}
