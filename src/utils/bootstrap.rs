//! Bootstrap utilities for changefeed binaries.
//!
//! Shared initialization code: tracing setup and feed construction from
//! configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LOG_ENV_VAR};
use crate::feed::{Feed, FeedOptions};
use crate::storage::{init_storage, StoreError};

/// Initialize tracing with the CHANGEFEED_LOG environment variable.
///
/// Defaults to "info" level if CHANGEFEED_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the configured store and build a feed over it.
pub async fn open_feed(config: &Config) -> Result<Feed, StoreError> {
    let store = init_storage(&config.storage).await?;
    Ok(Feed::new(store, FeedOptions::from(&config.feed)))
}
