//! Server bootstrap: environment configuration and the `hyper` loop.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use hyper::service::{make_service_fn, service_fn};
use hyper::{Error, Server};
use serde::Deserialize;
use slog::{error, info};

use primitives::Config;

use crate::storage::Storage;
use crate::Application;

pub const DEFAULT_PORT: u16 = 8005;

/// Process-level settings, separate from the application [`Config`].
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct EnvConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ip_addr")]
    pub ip_addr: IpAddr,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_addr, self.port)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_ip_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

/// Deserializes the application [`Config`] from environment variables.
/// Validation happens separately, before the server starts.
pub fn config_from_env() -> Result<Config, envy::Error> {
    envy::from_env()
}

/// Starts the `hyper` `Server`, shutting down on `SIGINT`.
pub async fn run<S: Storage>(app: Application<S>, socket_addr: SocketAddr) {
    let logger = app.logger.clone();
    info!(&logger, "Listening on {}", socket_addr);

    let make_service = make_service_fn(move |_| {
        let server = app.clone();
        async move {
            Ok::<_, Error>(service_fn(move |req| {
                let server = server.clone();
                async move { Ok::<_, Error>(server.handle_routing(req).await) }
            }))
        }
    });

    let server = Server::bind(&socket_addr)
        .serve(make_service)
        .with_graceful_shutdown(shutdown_signal());

    if let Err(error) = server.await {
        error!(&logger, "Server error"; "error" => %error);
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        panic!("Failed to listen for the shutdown signal: {}", error);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn env_config_defaults() {
        let config: EnvConfig =
            envy::from_iter(std::iter::empty::<(String, String)>()).expect("Should deserialize");

        assert_eq!(
            EnvConfig {
                port: DEFAULT_PORT,
                ip_addr: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            },
            config
        );
        assert_eq!("0.0.0.0:8005", config.socket_addr().to_string());
    }

    #[test]
    fn app_config_from_environment_pairs() {
        let vars = vec![
            ("AUTH_MODE".to_string(), "signature".to_string()),
            ("HMAC_SECRET".to_string(), "dark-matter".to_string()),
            ("ALLOWED_IPS".to_string(), "203.0.113.0/24".to_string()),
            ("REPLAY_WINDOW_SECS".to_string(), "120".to_string()),
        ];
        let config: Config = envy::from_iter(vars).expect("Should deserialize");

        assert_eq!(120, config.replay_window_secs);
        assert!(config.allowed_ips.is_some());
        assert_eq!(Ok(()), config.validate());
    }
}
