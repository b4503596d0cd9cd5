//! storeloc: backend-scoped storage locations.
//!
//! A [`Location`] is a normalized relative path bound to one storage
//! backend. It cannot escape the backend's root, it knows whether the
//! backend accepts writes, and it offers every operation both as a blocking
//! call and as an `async fn`, whichever style the backend's adapter speaks
//! natively.
//!
//! This crate re-exports the layers:
//! - [`core`]: paths, locations, the backend contract and the bridges
//! - [`local`]: directories on the local filesystem
//! - [`rclone`]: read-only remotes reached through the `rclone` executable
//!
//! ```rust,ignore
//! use storeloc::local::{LocalAdapter, LocalBackend, LocalOptions};
//! use storeloc::{Binding, Location};
//!
//! let backend = LocalBackend::new("/srv/library", LocalOptions::default())?;
//! let binding = Binding::blocking_native(LocalAdapter::new(backend));
//! let notes = Location::new(&binding, ["notes", "today.txt"])?;
//! notes.parent().mkdir(storeloc::MkdirOptions::new().parents(true).exist_ok(true))?;
//! notes.write_text("hello")?;
//! ```

pub use storeloc_core as core;
pub use storeloc_local as local;
pub use storeloc_rclone as rclone;

pub use storeloc_core::{
    Adapter, AsyncOps, Backend, BackendIdentity, BackendStatus, Binding, BlockingOps, Entries,
    Error, GlobPattern, Location, LocationStream, Metadata, MkdirOptions, OpenOptions, Result,
    Segments, Target, TextOptions, TouchOptions,
};
