use env_logger::Env;

/// Install the process logger. `FINESS_MATCHER_TRACING=1` switches from
/// env_logger to a tracing subscriber with `log` records bridged into it.
pub fn init_logging() {
    let use_tracing = std::env::var("FINESS_MATCHER_TRACING")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_tracing {
        init_tracing_from_env();
    } else {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
    }
}

pub fn init_tracing_from_env() {
    // Bridge log:: macros into tracing so library code keeps using the log facade
    let _ = tracing_log::LogTracer::init();
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
