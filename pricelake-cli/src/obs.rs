use pricelake_runner::LogFormat;

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "PRICELAKE_LOG";

/// Install the global subscriber. Logs go to stderr so stdout stays the report.
pub fn init_tracing(log_level: &str, log_format: LogFormat) -> Result<(), String> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|err| format!("failed to install tracing subscriber: {err}"))
}
