//! Price estimation for EV charging installations.
//!
//! [`assumptions`] holds the persisted coefficient table, [`estimate`]
//! prices a configured installation against it, and [`quote`] turns an
//! estimate into a printable, shareable quote.

pub mod assumptions;
pub mod contact;
pub mod estimate;
pub mod output;
pub mod quote;
pub mod storage;
pub mod types;
pub mod util;

use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins when set; otherwise `default_level`. Logs go to stderr so
/// they stay out of the interactive console.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(io::stderr))
        .init();
}
