//! Hardware capabilities used by the input engine
//!
//! The engine never talks to a bus directly. It goes through two small traits:
//!
//! - [`RegisterBus`] - register-addressed block transfers to one I2C device
//! - [`GpioCapability`] - pull-up inputs, edge subscription and level reads
//!
//! [`rpi`] implements both on top of `rppal`, [`ads1015`] builds the analog reader on
//! top of any [`RegisterBus`].
//!
//! ```text
//! rppal::Gpio ──► RppalGpio ──► EdgeEvent channel ──► DigitalEdgeMonitor
//! rppal::I2c  ──► RppalBus  ──► AnalogChannelReader ──► AnalogAxisDiscretizer
//! ```

pub mod ads1015;
pub mod rpi;

use tokio::sync::mpsc;

/// Electrical level of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// A raw transition reported by the GPIO capability
///
/// `level` is the level the capability observed at the edge. It is only a hint,
/// the edge monitor re-reads the line once the debounce window has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub pin: u8,
    pub level: Level,
}

/// Failure of a single register transfer
///
/// Transient by nature. Callers retry on the next poll instead of giving up.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to open bus {bus}: {reason}")]
    Open { bus: u8, reason: String },

    #[error("Write to register 0x{register:02X} failed: {reason}")]
    Write { register: u8, reason: String },

    #[error("Read from register 0x{register:02X} failed: {reason}")]
    Read { register: u8, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO controller unavailable: {0}")]
    Unavailable(String),

    #[error("Pin {pin} could not be configured: {reason}")]
    PinSetup { pin: u8, reason: String },

    #[error("Pin {0} was never configured as input")]
    UnknownPin(u8),

    #[error("Pin table lock poisoned")]
    LockPoisoned,
}

/// Register-addressed transfers to a single bus device
///
/// The device address is fixed when the bus handle is opened, the handle is owned
/// by exactly one reader.
pub trait RegisterBus: Send {
    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), BusError>;

    fn read_block(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusError>;
}

/// GPIO access needed by the edge monitor
pub trait GpioCapability: Send + Sync {
    /// Configure `pin` as an input with the internal pull-up enabled
    fn configure_input_pullup(&self, pin: u8) -> Result<(), GpioError>;

    /// Deliver every rising and falling edge of `pin` into `edges`
    fn subscribe_edges(
        &self,
        pin: u8,
        edges: mpsc::UnboundedSender<EdgeEvent>,
    ) -> Result<(), GpioError>;

    fn read_level(&self, pin: u8) -> Result<Level, GpioError>;
}
