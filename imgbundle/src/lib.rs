//! imgbundle - fetch remote images and save them as a single download
//!
//! This library fetches a list of URLs concurrently and streams the results
//! into a zip archive as they arrive, in input order, without buffering the
//! whole archive. A single URL is saved as is.
//!
//! # Modules
//!
//! - [`archive`]: streaming zip encoder (stored entries, data descriptors)
//! - [`fetch`]: HTTP fetching, ordered bounded-concurrency pipeline, naming
//! - [`sink`]: where output goes (`DirectorySink` writes via `.part` files)
//! - [`bundler`]: the top-level fetch-and-save operation
//! - [`config`], [`logging`]: ambient setup
//!
//! # Example
//!
//! ```ignore
//! use imgbundle::{BundleConfig, BundleRequest, Bundler};
//! use tokio_util::sync::CancellationToken;
//!
//! let bundler = Bundler::new(BundleConfig::default().with_output_dir("downloads"))?;
//! let report = bundler
//!     .run(
//!         BundleRequest::new(urls).on_progress(|done, total| println!("{done}/{total}")),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! ```

pub mod archive;
pub mod bundler;
pub mod checksum;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod sink;

pub use bundler::{BundleReport, BundleRequest, Bundler};
pub use config::{BundleConfig, ConfigFile, ConfigKey};
pub use error::{BundleError, BundleResult};
pub use sink::{DirectorySink, SavedFile, Sink, SinkError};
