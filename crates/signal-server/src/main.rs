//! Signaling server binary.
//!
//! # Usage
//!
//! ```bash
//! # Local development, no Redis required
//! signal-server --bind 0.0.0.0:8080 --sss-in-memory
//!
//! # Production
//! signal-server --bind 0.0.0.0:8080 --sss-host redis.internal --sss-port 6379
//! ```

use clap::Parser;
use signal_server::{
    AnySink, AnyStore, Args, Gateway, MemoryStore, NullAnalytics, PostgresAnalytics, RedisStore,
    ServerError, SystemEnv,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("signaling server starting");

    let store = if args.sss_in_memory {
        tracing::warn!("SSS_IN_MEMORY set: using the in-process store, not suitable for production");
        AnyStore::Memory(MemoryStore::new())
    } else {
        let url = args.sss_url();
        tracing::info!(sss_host = %args.sss_host, sss_port = args.sss_port, "connecting to shared state store");
        AnyStore::Redis(RedisStore::connect(&url).await.map_err(|err| {
            ServerError::Config(format!("failed to connect to shared state store: {err}"))
        })?)
    };

    let analytics = if args.as_enabled {
        let url = args
            .as_url
            .as_deref()
            .ok_or_else(|| ServerError::Config("AS_ENABLED is set but AS_URL is missing".to_string()))?;
        tracing::info!("connecting to analytics store");
        AnySink::Postgres(PostgresAnalytics::connect(url).await.map_err(|err| {
            ServerError::Config(format!("failed to connect to analytics store: {err}"))
        })?)
    } else {
        tracing::info!("analytics store disabled (AS_ENABLED=false)");
        AnySink::Null(NullAnalytics)
    };

    let ice_servers = args.load_ice_servers()?;
    let gateway = Gateway::new(store, analytics, SystemEnv::new(), ice_servers);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    gateway.run(&args.bind, shutdown).await?;

    tracing::info!("signaling server stopped");
    Ok(())
}
