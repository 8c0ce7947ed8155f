use time::UtcOffset;
use tracing_subscriber::{
    fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::config::LogConfig;
use crate::errors::{ClientError, ConfigValidationError};

pub fn setup_logging(config: &LogConfig) -> Result<(), ClientError> {
    // Validate logging config before proceeding
    config.validate().map_err(ClientError::Config)?;

    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    // Build the EnvFilter from the configured base level
    let mut env_filter = EnvFilter::default().add_directive(config.level_filter().into());

    // If trace_frames is enabled, add more specific filtering
    if config.trace_frames {
        env_filter = env_filter
            .add_directive("modbus_rtu_client::codec=trace".parse().unwrap())
            .add_directive("modbus_rtu_client::transaction=trace".parse().unwrap());
    }

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(config.thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_level(true)
        .with_timer(timer);

    let layer = if config.format.eq_ignore_ascii_case("json") {
        fmt_layer.json().with_filter(env_filter).boxed()
    } else {
        fmt_layer.with_filter(env_filter).boxed()
    };

    Registry::default().with(layer).try_init().map_err(|e| {
        ClientError::Config(ConfigValidationError::logging(format!(
            "Failed to initialize logging: {}",
            e
        )))
    })?;

    Ok(())
}
