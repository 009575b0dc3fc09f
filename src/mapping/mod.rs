//! Output side of the engine: how logical button transitions leave the process.
//!
//! Only the keyboard mapping lives here. Published snapshots go through [`crate::mqtt`].

pub mod error;
pub mod keyboard;

pub use error::SinkError;
pub use keyboard::{KeyCode, KeyMap, KeySink, LogKeySink, UinputKeySink};
