#![deny(clippy::all)]
#![deny(rust_2018_idioms)]

use clap::{crate_version, App, Arg};
use slog::info;

use postback::application::{config_from_env, run, EnvConfig};
use postback::db::{postgres_connection, setup_migrations};
use postback::events_api::EventsApi;
use postback::storage::PostgresStorage;
use postback::Application;
use primitives::config::Environment;
use primitives::util::logging::new_logger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = App::new("Postback")
        .version(crate_version!())
        .arg(
            Arg::new("migrate")
                .long("migrate")
                .help("run pending database migrations before starting"),
        )
        .get_matches();

    let env_config = EnvConfig::from_env()?;
    let config = config_from_env()?;
    config.validate()?;

    let logger = new_logger("postback");

    if cli.is_present("migrate") {
        let environment = match config.env {
            Environment::Development => "development",
            Environment::Production => "production",
        };
        info!(&logger, "Running database migrations"; "environment" => environment);
        setup_migrations(environment).await;
    }

    let storage = PostgresStorage::new(postgres_connection().await);
    let events_api = EventsApi::new(&config)?;
    if !events_api.is_configured() {
        info!(
            &logger,
            "Events API credentials not configured, notifications will be skipped"
        );
    }

    let socket_addr = env_config.socket_addr();
    let app = Application::new(config, logger, storage, events_api);

    run(app, socket_addr).await;

    Ok(())
}
