//! Backend-bound locations and their two operation surfaces.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::adapter::EntryIter;
use crate::backend::backend_addr;
use crate::glob::has_drive_prefix;
use crate::{
    AsyncFileHandle, AsyncOps, AsyncToSync, Backend, BlockingOps, Error, FileHandle, GlobPattern,
    Listing, Metadata, MkdirOptions, OpenOptions, Result, Segments, SyncToAsync, TextOptions,
    TouchOptions,
};

/// An adapter together with both of its operation surfaces.
///
/// One surface is the adapter itself, the other is the matching bridge.
/// Locations share a binding through an `Arc`; the backend is held by
/// reference and its lifetime is managed by whoever created it.
pub struct Binding {
    style: &'static str,
    backend: Arc<dyn Backend>,
    blocking: Arc<dyn BlockingOps>,
    suspending: Arc<dyn AsyncOps>,
}

impl Binding {
    /// Bind an adapter whose native style blocks.
    pub fn blocking_native<A: BlockingOps>(adapter: A) -> Arc<Binding> {
        let adapter = Arc::new(adapter);
        Arc::new(Binding {
            style: adapter.style(),
            backend: adapter.backend(),
            suspending: Arc::new(SyncToAsync::new(adapter.clone())),
            blocking: adapter,
        })
    }

    /// Bind an adapter whose native style suspends.
    pub fn suspend_native<A: AsyncOps>(adapter: A) -> Arc<Binding> {
        let adapter = Arc::new(adapter);
        Arc::new(Binding {
            style: adapter.style(),
            backend: adapter.backend(),
            blocking: Arc::new(AsyncToSync::new(adapter.clone())),
            suspending: adapter,
        })
    }

    pub fn style(&self) -> &'static str {
        self.style
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("style", &self.style)
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Where a `rename`/`replace` should go.
///
/// - A single name stays in the current parent directory
/// - Any other relative path is taken from the backend root
/// - An absolute path must lie inside the backend root
/// - A location must belong to the same backend and style
#[derive(Debug, Clone)]
pub enum Target {
    Raw(String),
    Location(Location),
}

impl From<&str> for Target {
    fn from(raw: &str) -> Self {
        Target::Raw(raw.to_string())
    }
}

impl From<String> for Target {
    fn from(raw: String) -> Self {
        Target::Raw(raw)
    }
}

impl From<&Path> for Target {
    fn from(path: &Path) -> Self {
        Target::Raw(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Target {
    fn from(path: PathBuf) -> Self {
        Target::from(path.as_path())
    }
}

impl From<&Location> for Target {
    fn from(location: &Location) -> Self {
        Target::Location(location.clone())
    }
}

impl From<Location> for Target {
    fn from(location: Location) -> Self {
        Target::Location(location)
    }
}

/// An immutable path bound to one backend.
///
/// Equality and hashing cover the adapter style, the backend's identity
/// (by reference) and the segments, so locations from different backends
/// never collide as map keys. Ordering is only defined within one
/// (style, backend) scope.
///
/// Every derivation (`joinpath`, `parent`, `with_name`, `rename`, ...)
/// returns a new value; a location never changes or rebinds.
#[derive(Clone)]
pub struct Location {
    segments: Segments,
    binding: Arc<Binding>,
    native: PathBuf,
}

impl Location {
    /// Build a location from raw parts, validating segments and
    /// containment.
    ///
    /// Segment validation is pure and runs first. The containment check
    /// belongs to the adapter: for local adapters it walks the existing
    /// prefixes with `lstat`, so construction and every checked
    /// derivation (`join`, `parent`, `with_name`, ...) touch the disk,
    /// also when called from async code. Missing prefixes end the walk
    /// without an error.
    ///
    /// ```rust,ignore
    /// let loc = Location::new(&binding, ["alpha/bravo", "charlie"])?;
    /// assert_eq!(loc.parts(), ["alpha", "bravo", "charlie"]);
    /// assert_eq!(loc.to_string(), "alpha/bravo/charlie");
    /// ```
    pub fn new<I, S>(binding: &Arc<Binding>, parts: I) -> Result<Location>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::checked(binding.clone(), Segments::parse(parts)?)
    }

    /// The root location of a binding.
    pub fn root(binding: &Arc<Binding>) -> Location {
        Self::bind(binding.clone(), Segments::root())
    }

    /// Bind segments after checking containment.
    pub fn from_segments(binding: &Arc<Binding>, segments: Segments) -> Result<Location> {
        Self::checked(binding.clone(), segments)
    }

    fn checked(binding: Arc<Binding>, segments: Segments) -> Result<Location> {
        binding.blocking.check_contained(&segments)?;
        Ok(Self::bind(binding, segments))
    }

    fn bind(binding: Arc<Binding>, segments: Segments) -> Location {
        let native = binding
            .blocking
            .native_path(&segments)
            .unwrap_or_else(|| PathBuf::from(binding.blocking.store_key(&segments)));
        Location {
            segments,
            binding,
            native,
        }
    }

    fn derive(&self, segments: Segments) -> Result<Location> {
        Self::checked(self.binding.clone(), segments)
    }

    fn derive_trusted(&self, segments: Segments) -> Location {
        Self::bind(self.binding.clone(), segments)
    }

    // ---- identity ----

    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.binding.backend
    }

    pub fn style(&self) -> &'static str {
        self.binding.style
    }

    fn same_scope(&self, other: &Location) -> bool {
        self.binding.style == other.binding.style
            && backend_addr(&self.binding.backend) == backend_addr(&other.binding.backend)
    }

    fn require_same_scope(&self, other: &Location) -> Result<()> {
        if self.same_scope(other) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "locations belong to different backends: {:?} vs {:?}",
                self, other
            )))
        }
    }

    /// Compare within one (style, backend) scope, failing across scopes.
    pub fn try_cmp(&self, other: &Location) -> Result<Ordering> {
        self.require_same_scope(other)?;
        Ok(self.segments.cmp(&other.segments))
    }

    // ---- pure path algebra ----

    pub fn segments(&self) -> &Segments {
        &self.segments
    }

    pub fn parts(&self) -> &[String] {
        self.segments.parts()
    }

    pub fn name(&self) -> &str {
        self.segments.name()
    }

    pub fn suffix(&self) -> &str {
        self.segments.suffix()
    }

    pub fn suffixes(&self) -> Vec<String> {
        self.segments.suffixes()
    }

    pub fn stem(&self) -> &str {
        self.segments.stem()
    }

    /// Always empty; locations have no drive.
    pub fn drive(&self) -> &str {
        ""
    }

    /// Always empty; locations are relative to their backend.
    pub fn root_str(&self) -> &str {
        ""
    }

    pub fn anchor(&self) -> &str {
        ""
    }

    pub fn is_absolute(&self) -> bool {
        false
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_root()
    }

    pub fn as_posix(&self) -> String {
        self.segments.as_posix()
    }

    /// The parent location. The root is its own parent.
    pub fn parent(&self) -> Location {
        if self.segments.is_root() {
            return self.clone();
        }
        self.derive_trusted(self.segments.parent())
    }

    /// Ancestors from nearest to the root. Empty for the root.
    pub fn parents(&self) -> Vec<Location> {
        self.segments
            .parents()
            .into_iter()
            .map(|s| self.derive_trusted(s))
            .collect()
    }

    pub fn joinpath<I, S>(&self, parts: I) -> Result<Location>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.derive(self.segments.join(parts)?)
    }

    pub fn join(&self, part: &str) -> Result<Location> {
        self.joinpath([part])
    }

    pub fn with_name(&self, name: &str) -> Result<Location> {
        self.derive(self.segments.with_name(name)?)
    }

    pub fn with_suffix(&self, suffix: &str) -> Result<Location> {
        self.derive(self.segments.with_suffix(suffix)?)
    }

    pub fn with_stem(&self, stem: &str) -> Result<Location> {
        self.derive(self.segments.with_stem(stem)?)
    }

    fn target_segments(&self, base: Target) -> Result<Segments> {
        match base {
            Target::Location(other) => {
                self.require_same_scope(&other)?;
                Ok(other.segments)
            }
            Target::Raw(raw) => Segments::parse_str(&raw),
        }
    }

    /// The part of this location below `base`.
    pub fn relative_to(&self, base: impl Into<Target>) -> Result<Location> {
        let base = self.target_segments(base.into())?;
        self.derive(self.segments.relative_to(&base)?)
    }

    /// Pure prefix test; unlike `relative_to` it does not check containment.
    pub fn is_relative_to(&self, base: impl Into<Target>) -> bool {
        self.target_segments(base.into())
            .and_then(|base| self.segments.relative_to(&base))
            .is_ok()
    }

    /// Pure shell-style match against the segments, anchored on the right.
    pub fn matches(&self, pattern: &str) -> Result<bool> {
        self.segments.matches(pattern)
    }

    // ---- native interop ----

    /// The exact key the backend uses for this location.
    pub fn as_store_key(&self) -> String {
        self.binding.blocking.store_key(&self.segments)
    }

    /// The absolute on-disk path, for local adapters.
    pub fn native_path(&self) -> Option<PathBuf> {
        self.binding.blocking.native_path(&self.segments)
    }

    fn resolve_target(&self, target: Target) -> Result<Segments> {
        let segments = match target {
            Target::Location(other) => {
                self.require_same_scope(&other)?;
                other.segments
            }
            Target::Raw(raw) => {
                let normalized = raw.replace('\\', "/");
                if normalized.starts_with('/') || has_drive_prefix(&normalized) {
                    self.binding.blocking.segments_from_native(&raw)?
                } else {
                    let parsed = Segments::parse_str(&raw)?;
                    match parsed.len() {
                        0 => return Err(Error::validation("empty rename target")),
                        1 => self.segments.parent().concat(&parsed),
                        _ => parsed,
                    }
                }
            }
        };
        if segments.is_root() {
            return Err(Error::validation("cannot move onto the backend root"));
        }
        self.binding.blocking.check_contained(&segments)?;
        Ok(segments)
    }

    fn guard_mutation(&self, operation: &'static str) -> Result<()> {
        if self.binding.backend.is_read_only() {
            return Err(Error::read_only(self.as_store_key(), operation));
        }
        Ok(())
    }

    fn entries(&self, inner: EntryIter) -> Entries {
        Entries {
            inner,
            binding: self.binding.clone(),
        }
    }

    fn stream(&self, listing: Listing) -> LocationStream {
        LocationStream {
            listing,
            binding: self.binding.clone(),
        }
    }

    // ---- blocking facade ----

    pub fn exists(&self) -> Result<bool> {
        self.binding.blocking.exists(&self.segments)
    }

    pub fn is_file(&self) -> Result<bool> {
        self.binding.blocking.is_file(&self.segments)
    }

    pub fn is_dir(&self) -> Result<bool> {
        self.binding.blocking.is_dir(&self.segments)
    }

    pub fn stat(&self) -> Result<Metadata> {
        self.binding.blocking.stat(&self.segments)
    }

    pub fn mkdir(&self, options: MkdirOptions) -> Result<()> {
        self.guard_mutation("mkdir")?;
        self.binding.blocking.mkdir(&self.segments, options)
    }

    pub fn unlink(&self, missing_ok: bool) -> Result<()> {
        self.guard_mutation("unlink")?;
        self.binding.blocking.unlink(&self.segments, missing_ok)
    }

    pub fn rmdir(&self) -> Result<()> {
        self.guard_mutation("rmdir")?;
        self.binding.blocking.rmdir(&self.segments)
    }

    /// Move this location, refusing to overwrite an existing target.
    pub fn rename(&self, target: impl Into<Target>) -> Result<Location> {
        self.guard_mutation("rename")?;
        let to = self.resolve_target(target.into())?;
        let moved = self.binding.blocking.rename(&self.segments, &to)?;
        Ok(self.derive_trusted(moved))
    }

    /// Move this location, overwriting an existing target.
    pub fn replace(&self, target: impl Into<Target>) -> Result<Location> {
        self.guard_mutation("replace")?;
        let to = self.resolve_target(target.into())?;
        let moved = self.binding.blocking.replace(&self.segments, &to)?;
        Ok(self.derive_trusted(moved))
    }

    pub fn touch(&self, options: TouchOptions) -> Result<()> {
        self.guard_mutation("touch")?;
        self.binding.blocking.touch(&self.segments, options)
    }

    pub fn iterdir(&self) -> Result<Entries> {
        Ok(self.entries(self.binding.blocking.iterdir(&self.segments)?))
    }

    pub fn glob(&self, pattern: &str) -> Result<Entries> {
        let pattern = GlobPattern::parse(pattern)?;
        Ok(self.entries(self.binding.blocking.glob(&self.segments, &pattern)?))
    }

    pub fn rglob(&self, pattern: &str) -> Result<Entries> {
        let pattern = GlobPattern::recursive(pattern)?;
        Ok(self.entries(self.binding.blocking.glob(&self.segments, &pattern)?))
    }

    /// Open with a mode string such as `"r"`, `"wb"` or `"a+"`.
    pub fn open(&self, mode: &str) -> Result<FileHandle> {
        self.open_with(OpenOptions::parse(mode)?)
    }

    pub fn open_with(&self, options: OpenOptions) -> Result<FileHandle> {
        options.validate()?;
        if options.is_mutating() {
            self.guard_mutation("open for writing")?;
        }
        let handle = self.binding.blocking.open(&self.segments, &options)?;
        FileHandle::new(handle, self.as_store_key()).with_options(&options)
    }

    /// Open, run `f`, and close the handle on every exit path.
    pub fn with_open<T>(
        &self,
        mode: &str,
        f: impl FnOnce(&mut FileHandle) -> Result<T>,
    ) -> Result<T> {
        self.with_open_options(OpenOptions::parse(mode)?, f)
    }

    pub fn with_open_options<T>(
        &self,
        options: OpenOptions,
        f: impl FnOnce(&mut FileHandle) -> Result<T>,
    ) -> Result<T> {
        let mut handle = self.open_with(options)?;
        let result = f(&mut handle);
        let closed = handle.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    pub fn read_bytes(&self) -> Result<Bytes> {
        self.with_open("rb", |h| h.read_to_end())
    }

    /// Strict UTF-8 with universal newlines.
    pub fn read_text(&self) -> Result<String> {
        self.read_text_with(&TextOptions::default())
    }

    pub fn read_text_with(&self, text: &TextOptions) -> Result<String> {
        self.with_open_options(OpenOptions::parse("r")?.with_text(text), |h| h.read_text())
    }

    pub fn write_bytes(&self, data: impl Into<Bytes>) -> Result<usize> {
        let data = data.into();
        self.with_open("wb", move |h| h.write(data))
    }

    pub fn write_text(&self, text: &str) -> Result<usize> {
        self.write_text_with(text, &TextOptions::default())
    }

    pub fn write_text_with(&self, text: &str, options: &TextOptions) -> Result<usize> {
        self.with_open_options(OpenOptions::parse("w")?.with_text(options), |h| {
            h.write_text(text)
        })
    }

    // ---- async facade ----

    pub async fn exists_async(&self) -> Result<bool> {
        self.binding.suspending.exists(&self.segments).await
    }

    pub async fn is_file_async(&self) -> Result<bool> {
        self.binding.suspending.is_file(&self.segments).await
    }

    pub async fn is_dir_async(&self) -> Result<bool> {
        self.binding.suspending.is_dir(&self.segments).await
    }

    pub async fn stat_async(&self) -> Result<Metadata> {
        self.binding.suspending.stat(&self.segments).await
    }

    pub async fn mkdir_async(&self, options: MkdirOptions) -> Result<()> {
        self.guard_mutation("mkdir")?;
        self.binding.suspending.mkdir(&self.segments, options).await
    }

    pub async fn unlink_async(&self, missing_ok: bool) -> Result<()> {
        self.guard_mutation("unlink")?;
        self.binding
            .suspending
            .unlink(&self.segments, missing_ok)
            .await
    }

    pub async fn rmdir_async(&self) -> Result<()> {
        self.guard_mutation("rmdir")?;
        self.binding.suspending.rmdir(&self.segments).await
    }

    pub async fn rename_async(&self, target: impl Into<Target>) -> Result<Location> {
        self.guard_mutation("rename")?;
        let to = self.resolve_target(target.into())?;
        let moved = self.binding.suspending.rename(&self.segments, &to).await?;
        Ok(self.derive_trusted(moved))
    }

    pub async fn replace_async(&self, target: impl Into<Target>) -> Result<Location> {
        self.guard_mutation("replace")?;
        let to = self.resolve_target(target.into())?;
        let moved = self.binding.suspending.replace(&self.segments, &to).await?;
        Ok(self.derive_trusted(moved))
    }

    pub async fn touch_async(&self, options: TouchOptions) -> Result<()> {
        self.guard_mutation("touch")?;
        self.binding.suspending.touch(&self.segments, options).await
    }

    pub async fn iterdir_async(&self) -> Result<LocationStream> {
        let listing = self.binding.suspending.iterdir(&self.segments).await?;
        Ok(self.stream(listing))
    }

    pub async fn glob_async(&self, pattern: &str) -> Result<LocationStream> {
        let pattern = GlobPattern::parse(pattern)?;
        let listing = self.binding.suspending.glob(&self.segments, &pattern).await?;
        Ok(self.stream(listing))
    }

    pub async fn rglob_async(&self, pattern: &str) -> Result<LocationStream> {
        let pattern = GlobPattern::recursive(pattern)?;
        let listing = self.binding.suspending.glob(&self.segments, &pattern).await?;
        Ok(self.stream(listing))
    }

    pub async fn open_async(&self, mode: &str) -> Result<AsyncFileHandle> {
        self.open_with_async(OpenOptions::parse(mode)?).await
    }

    pub async fn open_with_async(&self, options: OpenOptions) -> Result<AsyncFileHandle> {
        options.validate()?;
        if options.is_mutating() {
            self.guard_mutation("open for writing")?;
        }
        let handle = self.binding.suspending.open(&self.segments, &options).await?;
        AsyncFileHandle::new(handle, self.as_store_key()).with_options(&options)
    }

    pub async fn read_bytes_async(&self) -> Result<Bytes> {
        let mut handle = self.open_async("rb").await?;
        let result = handle.read_to_end().await;
        let closed = handle.close().await;
        let data = result?;
        closed?;
        Ok(data)
    }

    pub async fn read_text_async(&self) -> Result<String> {
        self.read_text_with_async(&TextOptions::default()).await
    }

    pub async fn read_text_with_async(&self, text: &TextOptions) -> Result<String> {
        let mut handle = self
            .open_with_async(OpenOptions::parse("r")?.with_text(text))
            .await?;
        let result = handle.read_text().await;
        let closed = handle.close().await;
        let data = result?;
        closed?;
        Ok(data)
    }

    pub async fn write_bytes_async(&self, data: impl Into<Bytes>) -> Result<usize> {
        let data = data.into();
        let mut handle = self.open_async("wb").await?;
        let result = handle.write(data).await;
        let closed = handle.close().await;
        let written = result?;
        closed?;
        Ok(written)
    }

    pub async fn write_text_async(&self, text: &str) -> Result<usize> {
        self.write_text_with_async(text, &TextOptions::default()).await
    }

    pub async fn write_text_with_async(&self, text: &str, options: &TextOptions) -> Result<usize> {
        let mut handle = self
            .open_with_async(OpenOptions::parse("w")?.with_text(options))
            .await?;
        let result = handle.write_text(text).await;
        let closed = handle.close().await;
        let written = result?;
        closed?;
        Ok(written)
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.same_scope(other) && self.segments == other.segments
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.binding.style.hash(state);
        backend_addr(&self.binding.backend).hash(state);
        self.segments.hash(state);
    }
}

impl PartialOrd for Location {
    /// `None` across backends or styles.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Location({}:{}, {:?})",
            self.binding.style,
            self.binding.backend.name(),
            self.segments.to_string()
        )
    }
}

impl AsRef<Path> for Location {
    /// The backend-resolved key: an absolute path for local adapters.
    fn as_ref(&self) -> &Path {
        &self.native
    }
}

impl From<&Location> for PathBuf {
    fn from(location: &Location) -> Self {
        location.native.clone()
    }
}

impl std::ops::Div<&str> for &Location {
    type Output = Result<Location>;

    fn div(self, rhs: &str) -> Self::Output {
        self.join(rhs)
    }
}

/// Blocking iterator over listing results.
pub struct Entries {
    inner: EntryIter,
    binding: Arc<Binding>,
}

impl Iterator for Entries {
    type Item = Result<Location>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|item| item.map(|segments| Location::bind(self.binding.clone(), segments)))
    }
}

/// Async stream over listing results.
pub struct LocationStream {
    listing: Listing,
    binding: Arc<Binding>,
}

impl LocationStream {
    pub async fn next(&mut self) -> Option<Result<Location>> {
        let item = self.listing.next().await?;
        Some(item.map(|segments| Location::bind(self.binding.clone(), segments)))
    }

    /// Drain the rest of the stream, failing on the first error.
    pub async fn collect(mut self) -> Result<Vec<Location>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}
