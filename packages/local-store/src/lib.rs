//! Local-directory backend for storeloc
//!
//! - [`LocalBackend`]: a root directory, its I/O smoke test and status
//! - [`LocalAdapter`]: blocking-native adapter over `std::fs`
//! - [`AsyncLocalAdapter`]: suspend-native adapter over `tokio::fs`
//!
//! Both adapters check containment on every primitive: a symlink inside the
//! root that leads outside it, or nowhere, is a validation error.
//!
//! # Example
//!
//! ```rust,ignore
//! use storeloc_core::{Binding, Location};
//! use storeloc_local::{LocalAdapter, LocalBackend, LocalOptions};
//!
//! let backend = LocalBackend::new("/srv/library", LocalOptions::default())?;
//! let binding = Binding::blocking_native(LocalAdapter::new(backend));
//! for entry in Location::root(&binding).rglob("*.epub")? {
//!     println!("{}", entry?);
//! }
//! ```

mod adapter;
mod async_adapter;
mod backend;
mod free_space;
mod handle;
mod options;
mod root;
mod smoke;
mod walk;

pub use adapter::{LocalAdapter, LOCAL_STYLE};
pub use async_adapter::{AsyncLocalAdapter, ASYNC_LOCAL_STYLE};
pub use backend::LocalBackend;
pub use free_space::{count_files, free_bytes};
pub use handle::{AsyncLocalFile, LocalFile};
pub use options::LocalOptions;
pub use root::LocalRoot;
pub use smoke::{SmokeCheck, SmokeReport, SmokeSizes, SmokeTest, SMOKE_DIR};
