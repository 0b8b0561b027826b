//! Startup configuration: CLI flags with environment-variable fallback.
//!
//! Deployment-level environment management (secrets rotation, multi-tenant
//! profiles, and the like) is out of scope; this module only covers the
//! minimum needed to start the binary, via `clap::Parser` rather than a
//! config-file crate.

use clap::Parser;
use signal_proto::IceServer;

use crate::error::ServerError;

/// Signaling server configuration.
#[derive(Parser, Debug)]
#[command(name = "signal-server")]
#[command(about = "Random-pairing voice-chat signaling server")]
#[command(version)]
pub struct Args {
    /// Address to bind the WebSocket listener to.
    #[arg(long, env = "PORT", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Shared State Store host.
    #[arg(long, env = "SSS_HOST", default_value = "127.0.0.1")]
    pub sss_host: String,

    /// Shared State Store port.
    #[arg(long, env = "SSS_PORT", default_value = "6379")]
    pub sss_port: u16,

    /// Shared State Store password, if required.
    #[arg(long, env = "SSS_PASSWORD")]
    pub sss_password: Option<String>,

    /// Shared State Store logical database index.
    #[arg(long, env = "SSS_DB", default_value = "0")]
    pub sss_db: u8,

    /// Use the in-process store instead of connecting to a real SSS.
    /// Intended for local development only.
    #[arg(long, env = "SSS_IN_MEMORY", default_value = "false")]
    pub sss_in_memory: bool,

    /// Enable the Analytics Store sink.
    #[arg(long, env = "AS_ENABLED", default_value = "false")]
    pub as_enabled: bool,

    /// Analytics Store (Postgres) connection URL.
    #[arg(long, env = "AS_URL")]
    pub as_url: Option<String>,

    /// Log level passed to `tracing_subscriber`'s `EnvFilter` when
    /// `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Path to a JSON file of ICE-server descriptors. Falls back to a
    /// single public STUN server if unset.
    #[arg(long, env = "ICE_SERVERS_JSON")]
    pub ice_servers_json: Option<String>,
}

impl Args {
    /// Build the Redis connection URL from the discrete `--sss-*` flags.
    #[must_use]
    pub fn sss_url(&self) -> String {
        let auth = self.sss_password.as_deref().map(|p| format!(":{p}@")).unwrap_or_default();
        format!("redis://{auth}{}:{}/{}", self.sss_host, self.sss_port, self.sss_db)
    }

    /// Load the ICE-server list from `--ice-servers-json`, or fall back to
    /// a single public STUN server.
    pub fn load_ice_servers(&self) -> Result<Vec<IceServer>, ServerError> {
        let Some(path) = &self.ice_servers_json else {
            return Ok(vec![IceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_string()],
                username: None,
                credential: None,
            }]);
        };

        let raw = std::fs::read_to_string(path)
            .map_err(|err| ServerError::Config(format!("reading {path}: {err}")))?;
        serde_json::from_str(&raw)
            .map_err(|err| ServerError::Config(format!("parsing {path}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sss_url_without_password() {
        let args = Args::parse_from(["signal-server"]);
        assert_eq!(args.sss_url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn sss_url_embeds_password() {
        let mut args = Args::parse_from(["signal-server"]);
        args.sss_password = Some("hunter2".to_string());
        assert_eq!(args.sss_url(), "redis://:hunter2@127.0.0.1:6379/0");
    }

    #[test]
    fn missing_ice_servers_json_falls_back_to_public_stun() {
        let args = Args::parse_from(["signal-server"]);
        let servers = args.load_ice_servers().unwrap();
        assert_eq!(servers.len(), 1);
        assert!(servers[0].urls[0].starts_with("stun:"));
    }
}
