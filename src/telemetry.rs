//! Tracing setup.
//!
//! `LOG_LEVEL` takes a full `EnvFilter` directive string, `LOG_FORMAT=json`
//! switches to structured output for log shippers.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,cyberquiz_backend=debug,tower_http=info,sqlx=warn";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
