//! Read-only storeloc backend for rclone remotes
//!
//! Any remote rclone can reach (`books:`, `s3:bucket/prefix`, ...) becomes
//! a backend whose locations support the full read surface. Each operation
//! is one rclone invocation; mutations fail with `Error::ReadOnly`.
//!
//! ```rust,ignore
//! use storeloc_core::{Binding, Location};
//! use storeloc_rclone::{RcloneAdapter, RcloneBackend, RcloneOptions};
//!
//! let backend = RcloneBackend::new("books:", RcloneOptions::default())?;
//! backend.startup()?;
//! let binding = Binding::blocking_native(RcloneAdapter::new(backend));
//! for entry in Location::root(&binding).rglob("*.epub")? {
//!     println!("{}", entry?.as_store_key());
//! }
//! ```

mod adapter;
mod backend;
mod cat;
mod lsjson;
mod runner;

pub use adapter::{RcloneAdapter, RCLONE_STYLE};
pub use backend::{RcloneBackend, RcloneOptions};
pub use cat::CatHandle;
pub use lsjson::{parse_list, parse_stat, LsJsonEntry};
pub use runner::{
    ProcessRunner, RcloneOutput, RcloneRunner, EXIT_DIR_NOT_FOUND, EXIT_FILE_NOT_FOUND,
};
