use serde::{Deserialize, Serialize};

/// Broker connection for the publish sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Pending requests before publishes start failing as queue-full
    pub queue_capacity: usize,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "joybonnet".to_string(),
            keep_alive_secs: 5,
            queue_capacity: 10,
            user: None,
            password: None,
        }
    }
}
