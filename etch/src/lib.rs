#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Request deduplication.
///
/// [`BroadcastConcurrencyManager`](concurrency::BroadcastConcurrencyManager) lets one
/// leader per resource fetch from upstream while the other callers wait for its
/// response.
pub mod concurrency;

/// Engine configuration.
pub mod config;

/// Error types.
pub mod error;

/// Cache-change event broadcasting.
pub mod events;

/// Request templates, engine responses and cache status.
pub mod exchange;

/// Finite State Machine for the incremental fetch protocol.
pub mod fsm;

/// Metrics collection.
///
/// When the `metrics` feature is enabled, counters are recorded for upstream
/// requests, deduplicated callers, consistency failures, cache writes and dropped
/// events.
pub mod metrics;

mod pipeline;

/// Overlap verification of partial responses.
pub mod verify;

/// Freshness-gated cache writes.
pub mod writer;

pub use concurrency::{BroadcastConcurrencyManager, ConcurrencyManager, NoopConcurrencyManager};
pub use config::EtchConfig;
pub use error::{ConfigError, FetchError};
pub use events::{EventBroadcaster, SubscriberId, Subscription};
pub use exchange::{CacheStatus, ProxyResponse, RequestTemplate};
pub use fsm::FetchOutcome;
pub use pipeline::{Etch, EtchBuilder};

pub use etch_backend::{BackendError, ContentStore, DeleteStatus};
pub use etch_core::{CacheEvent, CacheEventKind, CachedDocument, Freshness, ResourceId};
