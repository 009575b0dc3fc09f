//! Single-shot reader for the ADS1015 4-channel ADC
//!
//! Every read is a full conversion cycle:
//!
//! 1. write the configuration word (gain 1, 1600 SPS, single-shot, channel, start bit)
//! 2. poll the configuration register until the ready bit is set
//! 3. read the conversion register and drop the four unused low bits
//!
//! The ready poll is bounded by `conversion_timeout`. A stuck device yields
//! [`AdcError::ConversionTimeout`] instead of hanging the poll loop.

use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::{BusError, RegisterBus};

pub const DEFAULT_ADDRESS: u16 = 0x48;

const POINTER_CONVERSION: u8 = 0x00;
const POINTER_CONFIG: u8 = 0x01;

const CONFIG_CQUE_NONE: u16 = 0x0003;
const CONFIG_DR_1600SPS: u16 = 0x0080;
const CONFIG_MODE_SINGLE: u16 = 0x0100;
const CONFIG_GAIN_ONE: u16 = 0x0200;
const CONFIG_OS_SINGLE: u16 = 0x8000;

// Ready bit lives in the high byte of the config register
const READY_BIT: u8 = 0x80;

const READY_POLL_PAUSE: Duration = Duration::from_micros(100);

/// Single-ended input of the ADC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdcChannel {
    Ain0,
    Ain1,
    Ain2,
    Ain3,
}

impl AdcChannel {
    fn mux_bits(self) -> u16 {
        match self {
            AdcChannel::Ain0 => 0x4000,
            AdcChannel::Ain1 => 0x5000,
            AdcChannel::Ain2 => 0x6000,
            AdcChannel::Ain3 => 0x7000,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            AdcChannel::Ain0 => 0,
            AdcChannel::Ain1 => 1,
            AdcChannel::Ain2 => 2,
            AdcChannel::Ain3 => 3,
        }
    }
}

impl TryFrom<u8> for AdcChannel {
    type Error = AdcError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(AdcChannel::Ain0),
            1 => Ok(AdcChannel::Ain1),
            2 => Ok(AdcChannel::Ain2),
            3 => Ok(AdcChannel::Ain3),
            other => Err(AdcError::InvalidChannel(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdcError {
    #[error("Bus transfer failed: {0}")]
    Bus(#[from] BusError),

    #[error("Conversion on channel {channel} not ready after {waited:?}")]
    ConversionTimeout { channel: u8, waited: Duration },

    #[error("Invalid ADC channel {0}, expected 0..=3")]
    InvalidChannel(u8),
}

/// Configuration word that starts one conversion on `channel`
pub fn config_word(channel: AdcChannel) -> u16 {
    CONFIG_CQUE_NONE
        | CONFIG_DR_1600SPS
        | CONFIG_MODE_SINGLE
        | CONFIG_GAIN_ONE
        | channel.mux_bits()
        | CONFIG_OS_SINGLE
}

/// Exclusive owner of the ADC bus handle
pub struct AnalogChannelReader<B: RegisterBus> {
    bus: B,
    conversion_timeout: Duration,
}

impl<B: RegisterBus> AnalogChannelReader<B> {
    pub fn new(bus: B, conversion_timeout: Duration) -> Self {
        debug!(
            "Creating ADS1015 reader with conversion timeout {:?}",
            conversion_timeout
        );
        Self {
            bus,
            conversion_timeout,
        }
    }

    /// Run one single-shot conversion and return the 12-bit result
    pub fn read_channel(&mut self, channel: AdcChannel) -> Result<u16, AdcError> {
        let word = config_word(channel);
        let config = [(word >> 8) as u8, (word & 0xFF) as u8];
        trace!(
            "Setting config word 0x{:02X}{:02X} for channel {}",
            config[0],
            config[1],
            channel.index()
        );
        self.bus.write_block(POINTER_CONFIG, &config)?;

        self.wait_until_ready(channel)?;

        let mut data = [0u8; 2];
        self.bus.read_block(POINTER_CONVERSION, &mut data)?;
        let value = ((u16::from(data[0]) << 8) | u16::from(data[1])) >> 4;
        trace!("Channel {} -> {}", channel.index(), value);
        Ok(value)
    }

    // Transfer errors while polling are retried until the deadline
    fn wait_until_ready(&mut self, channel: AdcChannel) -> Result<(), AdcError> {
        let started = Instant::now();
        let mut status = [0u8; 2];

        loop {
            match self.bus.read_block(POINTER_CONFIG, &mut status) {
                Ok(()) if status[0] & READY_BIT != 0 => return Ok(()),
                Ok(()) => {}
                Err(e) => debug!("Ready poll on channel {} failed: {}", channel.index(), e),
            }

            let waited = started.elapsed();
            if waited >= self.conversion_timeout {
                warn!(
                    "Conversion on channel {} timed out after {:?}",
                    channel.index(),
                    waited
                );
                return Err(AdcError::ConversionTimeout {
                    channel: channel.index(),
                    waited,
                });
            }

            std::thread::sleep(READY_POLL_PAUSE);
        }
    }

    /// Give the bus handle back, closing the reader
    pub fn into_inner(self) -> B {
        self.bus
    }
}
