use slog::{o, Discard, Drain, Logger};
use slog_async::Async;
use slog_term::{CompactFormat, TermDecorator};

/// Terminal logger used by the server binary.
pub fn new_logger(prefix: &str) -> Logger {
    let decorator = TermDecorator::new().build();
    let drain = CompactFormat::new(decorator).build().fuse();
    let drain = Async::new(drain).build().fuse();

    Logger::root(drain, o!("service" => prefix.to_string()))
}

/// A logger that drops all records, for tests.
pub fn discard_logger() -> Logger {
    Logger::root(Discard, o!())
}
