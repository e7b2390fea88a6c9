//! Data layer: provider trait, adapters, dataset store, gap detection and the
//! cache reconciler.

pub mod canonicalize;
pub mod circuit_breaker;
pub mod dataset;
pub mod gaps;
pub mod memory;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use dataset::Dataset;
pub use gaps::Gap;
pub use memory::{FetchCall, MemoryProvider};
pub use provider::{DataError, PriceProvider, ProviderStamp, RawBar};
pub use reconcile::{FetchFailure, Quote, ReconcileOutcome, Tracker};
pub use store::{DatasetStore, StoreMeta};
pub use yahoo::YahooProvider;
