#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod context;
pub mod date;
pub mod document;
pub mod event;
pub mod key;
pub mod upstream;

pub use context::RequestContext;
pub use date::{format_http_date, parse_http_date};
pub use document::{CachedDocument, Freshness, line_count};
pub use event::{CacheEvent, CacheEventKind};
pub use key::ResourceId;
#[doc(hidden)]
pub use smol_str::SmolStr;
pub use upstream::{Upstream, UpstreamRequest, UpstreamResponse};
