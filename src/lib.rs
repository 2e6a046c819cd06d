//! Changefeed - ordered change feeds over key-value stores
//!
//! Layers an append-only, strictly ordered feed on any ordered key-value
//! store: every appended value gets the next change number, concurrent
//! appends are committed together, and readers can replay history or tail
//! the feed live.

pub mod codec;
pub mod config;
pub mod encoding;
pub mod feed;
pub mod storage;
pub mod utils;

pub use encoding::{Value, ValueEncoding};
pub use feed::{
    Append, Entry, Feed, FeedError, FeedOptions, FeedStream, GetOptions, ReadItem, ReadOptions,
};
pub use storage::{MemoryStore, Store, StoreError};
