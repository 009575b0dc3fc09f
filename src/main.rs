use color_eyre::{eyre::eyre, Result};
use joybonnet::config::BonnetConfig;
use joybonnet::controller::BonnetHandle;
use joybonnet::hw::rpi::{RppalBus, RppalGpio};
use joybonnet::mapping::{KeySink, LogKeySink, UinputKeySink};
use joybonnet::mqtt::MqttPublishSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let path = BonnetConfig::default_path()?;
    let config = BonnetConfig::load_or_create(&path).await?;

    // Missing hardware is fatal
    let gpio = Arc::new(RppalGpio::new()?);
    let bus = RppalBus::open(config.adc.i2c_bus, config.adc.address)?;

    let key_sink: Arc<dyn KeySink> = if config.keyboard.enabled {
        Arc::new(UinputKeySink::create(
            &config.keyboard.device_name,
            &config.keyboard.codes,
        )?)
    } else {
        warn!("Virtual keyboard disabled, key events are only logged");
        Arc::new(LogKeySink)
    };

    let shutdown = CancellationToken::new();
    let (publish_sink, mqtt_task) = MqttPublishSink::connect(&config.mqtt, shutdown.clone());

    let handle = BonnetHandle::spawn(
        &config,
        gpio,
        bus,
        key_sink,
        Arc::new(publish_sink),
        shutdown.clone(),
    )
    .map_err(|e| eyre!("Failed to start bonnet: {}", e))?;

    info!("joybonnet running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {}", e);
    }

    let stats = handle.shutdown().await?;
    if let Err(e) = mqtt_task.await {
        error!("MQTT task ended abnormally: {}", e);
    }
    info!(
        "Stopped after {} published and {} failed snapshots",
        stats.published, stats.failed
    );
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
