//! Initialize `log`/`env_logger` for a standalone process embedding the
//! engine, following the teacher's `logging`-feature-gated init pattern.

/// Initializes `env_logger` from `SCREAMROUTER_LOG` (falling back to `info`).
#[cfg(feature = "logging")]
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().filter_or("SCREAMROUTER_LOG", "info")).try_init();
}

/// No-op when the `logging` feature is disabled, so library consumers can
/// call `sr_engine::init_logging()` unconditionally without pulling in
/// `env_logger`.
#[cfg(not(feature = "logging"))]
pub fn init() {}
