//! Log initialization. Everything goes to stderr so stdout stays clean for
//! JSON output; artifacts and key material are never logged, only method
//! names, networks and sizes.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coldsign=info"));

    if std::env::var("COLDSIGN_LOG_JSON").map(|v| v == "1").unwrap_or(false) {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
