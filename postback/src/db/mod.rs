use std::env;

use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod};
use once_cell::sync::Lazy;
use tokio_postgres::NoTls;

pub use deadpool_postgres::{Pool as DbPool, PoolError};

pub mod click;
pub mod conversion;
pub mod nonce;

pub static POSTGRES_USER: Lazy<String> =
    Lazy::new(|| env::var("POSTGRES_USER").unwrap_or_else(|_| String::from("postgres")));
pub static POSTGRES_PASSWORD: Lazy<String> =
    Lazy::new(|| env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| String::from("postgres")));
pub static POSTGRES_HOST: Lazy<String> =
    Lazy::new(|| env::var("POSTGRES_HOST").unwrap_or_else(|_| String::from("localhost")));
pub static POSTGRES_PORT: Lazy<u16> = Lazy::new(|| {
    env::var("POSTGRES_PORT")
        .unwrap_or_else(|_| String::from("5432"))
        .parse()
        .expect("POSTGRES_PORT should be a valid port number")
});
pub static POSTGRES_DB: Lazy<Option<String>> = Lazy::new(|| env::var("POSTGRES_DB").ok());

pub async fn postgres_connection() -> DbPool {
    let mut config = tokio_postgres::Config::new();

    config
        .user(POSTGRES_USER.as_str())
        .password(POSTGRES_PASSWORD.as_str())
        .host(POSTGRES_HOST.as_str())
        .port(*POSTGRES_PORT);
    if let Some(db) = POSTGRES_DB.as_ref() {
        config.dbname(db);
    }

    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Verified,
    };
    let manager = Manager::from_config(config, NoTls, manager_config);

    DbPool::builder(manager)
        .max_size(42)
        .build()
        .expect("Should build postgres pool")
}

pub async fn setup_migrations(environment: &str) {
    use migrant_lib::{Config, Direction, Migrator, Settings};

    let settings = Settings::configure_postgres()
        .database_user(POSTGRES_USER.as_str())
        .database_password(POSTGRES_PASSWORD.as_str())
        .database_host(POSTGRES_HOST.as_str())
        .database_port(*POSTGRES_PORT)
        .database_name(
            POSTGRES_DB
                .as_deref()
                .unwrap_or_else(|| POSTGRES_USER.as_str()),
        )
        .build()
        .expect("Should build migration settings");

    let mut config = Config::with_settings(&settings);
    config.setup().expect("Should setup Postgres connection");
    // Toggle setting so tags are validated in a cli compatible manner.
    // This needs to happen before any call to `Config::use_migrations` or `Config::reload`
    config.use_cli_compatible_tags(true);

    macro_rules! make_migration {
        ($tag:expr) => {
            migrant_lib::EmbeddedMigration::with_tag($tag)
                .up(include_str!(concat!("../../migrations/", $tag, "/up.sql")))
                .down(include_str!(concat!("../../migrations/", $tag, "/down.sql")))
                .boxed()
        };
    }

    let mut migrations = vec![make_migration!("20240601120000_initial_tables")];

    if environment == "development" {
        // seeds a couple of click-context rows for local testing
        migrations.push(make_migration!("20240601120001_development_seed"));
    }

    config
        .use_migrations(&migrations)
        .expect("Loading migrations failed");

    // Reload config, ping the database for applied migrations
    let config = config.reload().expect("Should reload applied migrations");

    Migrator::with_config(&config)
        .direction(Direction::Up)
        .all(true)
        .show_output(true)
        .swallow_completion(true)
        .apply()
        .expect("Applying migrations failed");

    let _config = config
        .reload()
        .expect("Reloading config for migration failed");
}
