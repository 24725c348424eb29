//! # dirstore cache
//!
//! Short-lived key-value state with a time to live, kept in one of three
//! interchangeable places:
//!
//! - [`InMemoryCacheProvider`] - an expiring map inside the process
//! - [`NativePersistenceCacheProvider`] - entries stored through a
//!   [`PersistenceEngine`](dirstore_core::PersistenceEngine)
//! - [`RemoteCacheProvider`] - a key-value server behind
//!   [`RemoteCacheClient`]
//!
//! [`CacheService`] is the facade; its write `region` is the time to live in
//! seconds. [`CacheProviderFactory`] picks the provider a
//! [`CacheConfiguration`] selects and [`CacheCleaner`] sweeps expired
//! entries in the background.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cleanup;
mod clock;
mod config;
mod error;
mod factory;
mod memory;
mod native;
mod provider;
mod remote;
mod service;

pub use cleanup::CacheCleaner;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfiguration, InMemoryConfiguration, NativePersistenceConfiguration, RemoteConfiguration,
    DEFAULT_CLEANUP_BATCH_SIZE, DEFAULT_CLEANUP_INTERVAL, DEFAULT_PUT_EXPIRATION,
};
pub use error::{CacheError, CacheResult};
pub use factory::CacheProviderFactory;
pub use memory::InMemoryCacheProvider;
pub use native::{hash_key, CacheRecord, NativePersistenceCacheProvider, CACHE_BRANCH};
pub use provider::{CacheProvider, CacheProviderExt, CacheProviderType};
pub use remote::{RemoteCacheClient, RemoteCacheProvider};
pub use service::{region_ttl, CacheService};
