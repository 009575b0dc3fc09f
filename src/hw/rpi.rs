//! Raspberry Pi implementations of the hardware capabilities, backed by `rppal`

use rppal::gpio::{self, Event, Gpio, InputPin, Trigger};
use rppal::i2c::I2c;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{BusError, EdgeEvent, GpioCapability, GpioError, Level, RegisterBus};

/// I2C device handle opened at a fixed slave address
pub struct RppalBus {
    i2c: I2c,
    bus: u8,
    address: u16,
}

impl RppalBus {
    pub fn open(bus: u8, address: u16) -> Result<Self, BusError> {
        info!("Opening I2C bus {} at address 0x{:02X}", bus, address);
        let mut i2c = I2c::with_bus(bus).map_err(|e| BusError::Open {
            bus,
            reason: e.to_string(),
        })?;
        i2c.set_slave_address(address)
            .map_err(|e| BusError::Open {
                bus,
                reason: format!("slave address 0x{:02X}: {}", address, e),
            })?;
        Ok(Self { i2c, bus, address })
    }
}

impl RegisterBus for RppalBus {
    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), BusError> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(register);
        frame.extend_from_slice(bytes);
        self.i2c.write(&frame).map_err(|e| BusError::Write {
            register,
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn read_block(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        self.i2c
            .write_read(&[register], buffer)
            .map_err(|e| BusError::Read {
                register,
                reason: e.to_string(),
            })
    }
}

impl Drop for RppalBus {
    fn drop(&mut self) {
        info!(
            "i2c shutdown (bus {}, address 0x{:02X})",
            self.bus, self.address
        );
    }
}

/// GPIO controller with the input pins it has configured
pub struct RppalGpio {
    gpio: Gpio,
    pins: Mutex<HashMap<u8, InputPin>>,
}

impl RppalGpio {
    pub fn new() -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|e| GpioError::Unavailable(e.to_string()))?;
        info!("GPIO controller opened");
        Ok(Self {
            gpio,
            pins: Mutex::new(HashMap::new()),
        })
    }
}

impl GpioCapability for RppalGpio {
    fn configure_input_pullup(&self, pin: u8) -> Result<(), GpioError> {
        let input = self
            .gpio
            .get(pin)
            .map_err(|e| GpioError::PinSetup {
                pin,
                reason: e.to_string(),
            })?
            .into_input_pullup();
        debug!("Pin {} configured as pulled-up input", pin);

        let mut pins = self.pins.lock().map_err(|_| GpioError::LockPoisoned)?;
        pins.insert(pin, input);
        Ok(())
    }

    fn subscribe_edges(
        &self,
        pin: u8,
        edges: mpsc::UnboundedSender<EdgeEvent>,
    ) -> Result<(), GpioError> {
        let mut pins = self.pins.lock().map_err(|_| GpioError::LockPoisoned)?;
        let input = pins.get_mut(&pin).ok_or(GpioError::UnknownPin(pin))?;

        // Debouncing happens in the edge monitor, rppal reports every edge
        input
            .set_async_interrupt(Trigger::Both, None, move |event: Event| {
                let level = match event.trigger {
                    Trigger::FallingEdge => Level::Low,
                    _ => Level::High,
                };
                if edges.send(EdgeEvent { pin, level }).is_err() {
                    warn!("Edge on pin {} dropped, monitor is gone", pin);
                }
            })
            .map_err(|e| GpioError::PinSetup {
                pin,
                reason: e.to_string(),
            })?;

        debug!("Edge interrupt registered on pin {}", pin);
        Ok(())
    }

    fn read_level(&self, pin: u8) -> Result<Level, GpioError> {
        let pins = self.pins.lock().map_err(|_| GpioError::LockPoisoned)?;
        let input = pins.get(&pin).ok_or(GpioError::UnknownPin(pin))?;
        Ok(match input.read() {
            gpio::Level::Low => Level::Low,
            gpio::Level::High => Level::High,
        })
    }
}
