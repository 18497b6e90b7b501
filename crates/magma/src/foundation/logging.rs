//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with a default filter such as `"debug"` or
/// `"magma=trace"`; `RUST_LOG` still takes precedence when set.
///
/// Safe to call more than once, later calls are ignored.
pub fn init_with_level(filter: &str) {
    let env = env_logger::Env::default().default_filter_or(filter);
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MagmaConfig;

    #[test]
    fn test_repeated_init_is_ignored() {
        let config = MagmaConfig::default().with_log_level("magma=trace");
        init_with_level(&config.log_level);
        init_with_level("warn");
        debug!("logging initialized twice");
    }
}
