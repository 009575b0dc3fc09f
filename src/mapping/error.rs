//! Error definitions for the output sinks

use thiserror::Error;

/// Failures of the key event and publish sinks
///
/// None of them is fatal once the engine runs. Callers log and carry on with the
/// next event or publish cycle.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink exists but refused or could not take the item right now
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// The sink queue is full, the item was not enqueued
    #[error("Sink queue full: {0}")]
    QueueFull(String),

    /// The item could not be encoded for the sink
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The sink could not be created at startup
    #[error("Sink initialization failed: {0}")]
    Initialization(String),
}
