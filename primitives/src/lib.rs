#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

pub mod allowlist;
pub mod config;
pub mod conversion;
pub mod postback;
pub mod util {
    pub mod logging;
}

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "test-util")]
pub mod test_util;

pub use self::allowlist::IpAllowlist;
pub use self::config::{AuthMode, Config, Environment};
pub use self::conversion::{ClickContext, ConversionRecord, ConversionStatus, NonceRecord};
