//! Concurrent retrieval of remote sources.
//!
//! - HTTP seam and reqwest-backed fetcher (`http`)
//! - Ordered, bounded-concurrency pipeline (`pipeline`)
//! - Entry and archive naming (`naming`)
//! - Caller callbacks (`progress`)
//! - Run outcome (`state`)

mod error;
pub(crate) mod http;
pub mod naming;
mod pipeline;
mod progress;
mod state;

pub use error::{FetchError, FetchResult};
pub use http::{FetchFuture, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use naming::{archive_file_name, file_name_from_url, sanitize_archive_name, NameAllocator};
pub use pipeline::{FetchPipeline, Fetched, OrderedFetches, DEFAULT_CONCURRENCY};
pub use progress::{ErrorCallback, ProgressCallback, ProgressReporter};
pub use state::{FailedSource, FetchState};
