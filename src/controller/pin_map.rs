//! Mapping from pin identifiers to logical buttons
//!
//! Real GPIO lines use their BCM number. The four analog directions use synthetic
//! identifiers from a reserved range starting at [`SYNTHETIC_BASE`], so both kinds
//! can share one transition path without colliding.

use std::collections::HashMap;
use std::fmt;

use super::input_state::LogicalButton;

pub const SYNTHETIC_BASE: u16 = 1000;

/// Physical GPIO number or synthetic analog-direction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(u16);

impl PinId {
    pub const ANALOG_UP: PinId = PinId(SYNTHETIC_BASE);
    pub const ANALOG_DOWN: PinId = PinId(SYNTHETIC_BASE + 1);
    pub const ANALOG_LEFT: PinId = PinId(SYNTHETIC_BASE + 2);
    pub const ANALOG_RIGHT: PinId = PinId(SYNTHETIC_BASE + 3);

    pub fn gpio(pin: u8) -> Self {
        PinId(u16::from(pin))
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn is_synthetic(self) -> bool {
        self.0 >= SYNTHETIC_BASE
    }

    /// BCM number for real pins, `None` for synthetic ones
    pub fn as_gpio(self) -> Option<u8> {
        if self.is_synthetic() {
            None
        } else {
            u8::try_from(self.0).ok()
        }
    }
}

impl From<u16> for PinId {
    fn from(raw: u16) -> Self {
        PinId(raw)
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinMapError {
    #[error("Pin {pin} is already mapped to {existing}")]
    PinTaken { pin: PinId, existing: LogicalButton },

    #[error("Button {button} is already mapped to pin {existing}")]
    ButtonTaken { button: LogicalButton, existing: PinId },

    #[error("Pin {0} lies in the synthetic range (>= 1000)")]
    SyntheticRange(PinId),

    #[error("Direction {0} is reserved for the analog stick")]
    ReservedDirection(LogicalButton),
}

/// Injective pin → button relation
#[derive(Debug, Clone, Default)]
pub struct PinMap {
    by_pin: HashMap<PinId, LogicalButton>,
    by_button: HashMap<LogicalButton, PinId>,
}

impl PinMap {
    /// Empty map with only the four synthetic analog directions bound
    pub fn with_analog_directions() -> Self {
        let mut map = Self::default();
        for (pin, button) in [
            (PinId::ANALOG_UP, LogicalButton::Up),
            (PinId::ANALOG_DOWN, LogicalButton::Down),
            (PinId::ANALOG_LEFT, LogicalButton::Left),
            (PinId::ANALOG_RIGHT, LogicalButton::Right),
        ] {
            map.by_pin.insert(pin, button);
            map.by_button.insert(button, pin);
        }
        map
    }

    /// Bind a physical GPIO to a button
    pub fn bind_gpio(&mut self, pin: u8, button: LogicalButton) -> Result<(), PinMapError> {
        let pin = PinId::gpio(pin);
        if button.is_direction() {
            return Err(PinMapError::ReservedDirection(button));
        }
        self.insert(pin, button)
    }

    fn insert(&mut self, pin: PinId, button: LogicalButton) -> Result<(), PinMapError> {
        if pin.is_synthetic() && !button.is_direction() {
            return Err(PinMapError::SyntheticRange(pin));
        }
        if let Some(existing) = self.by_pin.get(&pin) {
            return Err(PinMapError::PinTaken {
                pin,
                existing: *existing,
            });
        }
        if let Some(existing) = self.by_button.get(&button) {
            return Err(PinMapError::ButtonTaken {
                button,
                existing: *existing,
            });
        }
        self.by_pin.insert(pin, button);
        self.by_button.insert(button, pin);
        Ok(())
    }

    pub fn button_for(&self, pin: PinId) -> Option<LogicalButton> {
        self.by_pin.get(&pin).copied()
    }

    pub fn pin_for(&self, button: LogicalButton) -> Option<PinId> {
        self.by_button.get(&button).copied()
    }

    /// Physical pins in ascending order
    pub fn gpio_pins(&self) -> Vec<(u8, LogicalButton)> {
        let mut pins: Vec<(u8, LogicalButton)> = self
            .by_pin
            .iter()
            .filter_map(|(pin, button)| pin.as_gpio().map(|gpio| (gpio, *button)))
            .collect();
        pins.sort_by_key(|(gpio, _)| *gpio);
        pins
    }

    pub fn len(&self) -> usize {
        self.by_pin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pin.is_empty()
    }
}
