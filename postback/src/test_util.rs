//! Test fixtures for exercising handlers without Postgres or network.

use primitives::util::logging::discard_logger;
use primitives::Config;

use crate::events_api::EventsApi;
use crate::storage::MemoryStorage;
use crate::Application;

/// An [`Application`] over in-memory storage. With the `test-util`
/// configs the Events API is unconfigured, so no request leaves the
/// process.
pub fn setup_test_app(config: Config) -> Application<MemoryStorage> {
    let events_api = EventsApi::new(&config).expect("Should build Events API client");

    Application::new(config, discard_logger(), MemoryStorage::new(), events_api)
}
