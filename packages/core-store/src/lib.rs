//! Core storeloc: backend-scoped locations
//!
//! This layer gives application code one path type for every storage
//! backend:
//! - `Segments`: normalized, escape-free relative path algebra
//! - `Location`: segments bound to a backend, with a blocking and an async
//!   operation surface
//! - `Backend`: identity, status and self-test of a storage endpoint
//! - `BlockingOps` / `AsyncOps`: what an adapter implements natively
//! - `SyncToAsync` / `AsyncToSync`: bridges that derive the other surface
//!
//! # Example
//!
//! ```rust,ignore
//! use storeloc_core::{Binding, Location};
//!
//! let binding = Binding::blocking_native(adapter);
//! let hello = Location::new(&binding, ["bridges", "hello.txt"])?;
//! hello.write_text("hello\n")?;
//! assert_eq!(hello.read_text_async().await?, "hello\n");
//! ```

pub use bytes::Bytes;

mod adapter;
mod async_bridge;
mod backend;
mod bridge;
mod error;
mod glob;
mod handle;
mod listing;
mod location;
mod metadata;
mod options;
mod path;
mod scheduler;
mod text;

pub use adapter::{Adapter, AsyncOps, BlockingOps, EntryIter};
pub use async_bridge::{offload, OffloadedHandle, SyncToAsync};
pub use backend::{
    safe_name, Backend, BackendIdentity, BackendState, BackendStatus, CheckStatus, Event,
    EventLog,
};
pub use bridge::{AsyncToSync, ScheduledHandle};
pub use error::{Error, Result};
pub use glob::{GlobPattern, SegmentMatcher};
pub use handle::{AsyncFileHandle, AsyncHandle, BlockingHandle, FileHandle};
pub use listing::{Listing, LISTING_CAPACITY};
pub use location::{Binding, Entries, Location, LocationStream, Target};
pub use metadata::{EntryKind, Metadata};
pub use options::{MkdirOptions, OpenOptions, TextOptions, TouchOptions};
pub use path::Segments;
pub use scheduler::Scheduler;
pub use text::{DecodeErrors, TextCodec};
