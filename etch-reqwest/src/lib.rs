#![doc = include_str!("../README.md")]

mod middleware;
mod upstream;

pub use middleware::EtchMiddleware;
pub use upstream::ReqwestUpstream;

pub use etch::{
    BroadcastConcurrencyManager, CacheEvent, CacheStatus, ConcurrencyManager, Etch, EtchConfig,
    NoopConcurrencyManager,
};
