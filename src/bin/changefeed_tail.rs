//! changefeed-tail: live-tail a feed
//!
//! Opens the configured store, then prints every entry after
//! `tail.since` as one JSON line on stdout, waiting for new entries as they
//! are appended.
//!
//! ## Configuration
//! - CHANGEFEED_CONFIG: Path to a YAML config file (optional)
//! - CHANGEFEED__STORAGE__TYPE / CHANGEFEED__STORAGE__PATH: Store selection
//! - CHANGEFEED_TAIL_SINCE: Exclusive starting change (default: from start)
//! - CHANGEFEED_LOG: Log filter (default: info)

use futures::StreamExt;
use serde_json::json;
use tracing::{info, warn};

use changefeed::config::Config;
use changefeed::utils::bootstrap::{init_tracing, open_feed};
use changefeed::{ReadItem, ReadOptions, Value};

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => json!(text),
            Err(_) => json!(hex::encode(bytes)),
        },
        Value::Text(text) => json!(text),
        Value::Json(doc) => doc.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let feed = open_feed(&config).await?;

    let mut options = ReadOptions::new().live();
    options.since = config.tail.since;
    options.limit = config.tail.limit;

    info!(
        since = ?options.since,
        limit = ?options.limit,
        storage_type = ?config.storage.storage_type,
        "changefeed-tail started"
    );

    let mut entries = feed.read_stream(options);
    loop {
        tokio::select! {
            item = entries.next() => match item {
                Some(Ok(ReadItem::Entry(entry))) => {
                    println!("{}", json!({ "change": entry.change, "value": value_to_json(&entry.value) }));
                }
                Some(Ok(other)) => warn!(item = ?other, "Unexpected item shape"),
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    Ok(())
}
