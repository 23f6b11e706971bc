use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Everything at info, this binary's own events at debug.
fn default_filter() -> String {
  format!("info,{}=debug", env!("CARGO_CRATE_NAME"))
}

/// Initialize structured logging to stderr. `RUST_LOG` overrides the default filter.
///
/// stdout is left alone: the offline subcommands write their results there.
pub fn init_logging() -> Result<()> {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init()
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

  Ok(())
}
