use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Sets up the global tracing subscriber.
///
/// Development uses a human-readable format, production emits JSON.
/// `RUST_LOG` overrides the default filter in both cases.
pub fn setup_tracing(is_production: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production {
            "info".into()
        } else {
            "upnifia_server=debug,tower_http=debug".into()
        }
    });

    let subscriber = tracing_subscriber::registry().with(filter);

    if is_production {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    };
}
