//! # State publishing
//!
//! Periodically serializes the input snapshot and hands it to a publish sink. The
//! scheduler is a statum state machine (Idle → Waiting → Publishing → Waiting) running
//! as one tokio task; the sink behind it is an MQTT client by default.
//!
//! ```text
//! mqtt/
//! ├── config.rs        - Broker connection settings
//! ├── message.rs       - JSON payload
//! ├── publisher.rs     - PublishScheduler and the PublishSink trait
//! └── mqtt_handler.rs  - rumqttc sink and its event loop task
//! ```

pub mod config;
pub mod message;
pub mod mqtt_handler;
pub mod publisher;

pub use config::MqttConfig;
pub use message::StatePayload;
pub use mqtt_handler::MqttPublishSink;
pub use publisher::{PublishScheduler, PublishSettings, PublishSink, PublishStats};
