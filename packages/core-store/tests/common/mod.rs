//! In-memory backend and adapters shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use storeloc_core::{
    Adapter, AsyncHandle, AsyncOps, Backend, BackendIdentity, BackendState, BackendStatus,
    BlockingHandle, BlockingOps, CheckStatus, EntryIter, EntryKind, Error, GlobPattern, Listing,
    Metadata, MkdirOptions, OpenOptions, Result, Segments, TouchOptions,
};

#[derive(Debug)]
pub struct MemBackend {
    state: BackendState,
    read_only: bool,
}

impl MemBackend {
    pub fn new(url: &str, read_only: bool) -> Arc<Self> {
        Arc::new(MemBackend {
            state: BackendState::new(BackendIdentity::new(url, None, None)),
            read_only,
        })
    }
}

impl Backend for MemBackend {
    fn state(&self) -> &BackendState {
        &self.state
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn self_test(&self) -> Result<BackendStatus> {
        let mut report = self.state.report(
            CheckStatus {
                marker_file: true,
                read: true,
                write: !self.read_only,
                sundry: true,
            },
            "ok",
        );
        report.online = true;
        report.checked = true;
        self.state.record(&report)?;
        Ok(report)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

type Tree = Arc<Mutex<BTreeMap<Segments, Node>>>;

/// Blocking-native in-memory adapter.
pub struct MemAdapter {
    backend: Arc<MemBackend>,
    tree: Tree,
}

impl MemAdapter {
    pub fn new(backend: Arc<MemBackend>) -> Self {
        MemAdapter {
            backend,
            tree: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn node(&self, at: &Segments) -> Option<Node> {
        if at.is_root() {
            return Some(Node::Dir);
        }
        self.tree.lock().unwrap().get(at).cloned()
    }

    fn ensure_parents(&self, at: &Segments) {
        let mut tree = self.tree.lock().unwrap();
        for parent in at.parents() {
            if !parent.is_root() {
                tree.entry(parent).or_insert(Node::Dir);
            }
        }
    }

    fn move_tree(&self, at: &Segments, to: &Segments, overwrite: bool) -> Result<Segments> {
        if self.node(at).is_none() {
            return Err(Error::not_found(at.to_string()));
        }
        if !overwrite && self.node(to).is_some() {
            return Err(Error::AlreadyExists {
                key: to.to_string(),
            });
        }
        self.ensure_parents(to);
        let mut tree = self.tree.lock().unwrap();
        let moved: Vec<(Segments, Node)> = tree
            .iter()
            .filter(|(k, _)| k.has_prefix(at))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, node) in moved {
            tree.remove(&key);
            let rest = key.strip_prefix(at).unwrap();
            tree.insert(to.concat(&rest), node);
        }
        Ok(to.clone())
    }
}

impl Adapter for MemAdapter {
    fn style(&self) -> &'static str {
        "mem"
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    fn check_contained(&self, _at: &Segments) -> Result<()> {
        Ok(())
    }

    fn store_key(&self, at: &Segments) -> String {
        format!("mem://{}/{}", self.backend.name(), at)
    }
}

impl BlockingOps for MemAdapter {
    fn exists(&self, at: &Segments) -> Result<bool> {
        Ok(self.node(at).is_some())
    }

    fn is_file(&self, at: &Segments) -> Result<bool> {
        Ok(matches!(self.node(at), Some(Node::File(_))))
    }

    fn is_dir(&self, at: &Segments) -> Result<bool> {
        Ok(matches!(self.node(at), Some(Node::Dir)))
    }

    fn stat(&self, at: &Segments) -> Result<Metadata> {
        let (kind, size) = match self.node(at) {
            Some(Node::Dir) => (EntryKind::Dir, 0),
            Some(Node::File(data)) => (EntryKind::File, data.len() as u64),
            None => return Err(Error::not_found(at.to_string())),
        };
        Ok(Metadata {
            kind,
            size,
            modified: None,
            readonly: false,
            mode: None,
        })
    }

    fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()> {
        match self.node(at) {
            Some(Node::Dir) if options.exist_ok => return Ok(()),
            Some(_) => {
                return Err(Error::AlreadyExists {
                    key: at.to_string(),
                })
            }
            None => {}
        }
        if options.parents {
            self.ensure_parents(at);
        } else if !matches!(self.node(&at.parent()), Some(Node::Dir)) {
            return Err(Error::not_found(at.parent().to_string()));
        }
        self.tree.lock().unwrap().insert(at.clone(), Node::Dir);
        Ok(())
    }

    fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()> {
        match self.node(at) {
            Some(Node::File(_)) => {
                self.tree.lock().unwrap().remove(at);
                Ok(())
            }
            Some(Node::Dir) => Err(Error::validation("is a directory")),
            None if missing_ok => Ok(()),
            None => Err(Error::not_found(at.to_string())),
        }
    }

    fn rmdir(&self, at: &Segments) -> Result<()> {
        match self.node(at) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(Error::validation("not a directory")),
            None => return Err(Error::not_found(at.to_string())),
        }
        let mut tree = self.tree.lock().unwrap();
        if tree.keys().any(|k| k != at && k.has_prefix(at)) {
            return Err(Error::Integrity {
                key: at.to_string(),
                message: "directory not empty".into(),
            });
        }
        tree.remove(at);
        Ok(())
    }

    fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        self.move_tree(at, to, false)
    }

    fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        self.move_tree(at, to, true)
    }

    fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()> {
        match self.node(at) {
            Some(_) if !options.exist_ok => Err(Error::AlreadyExists {
                key: at.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.tree
                    .lock()
                    .unwrap()
                    .insert(at.clone(), Node::File(Vec::new()));
                Ok(())
            }
        }
    }

    fn iterdir(&self, at: &Segments) -> Result<EntryIter> {
        if !matches!(self.node(at), Some(Node::Dir)) {
            return Err(Error::not_found(at.to_string()));
        }
        let children: Vec<Result<Segments>> = self
            .tree
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.len() == at.len() + 1 && k.has_prefix(at))
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::new(children.into_iter()))
    }

    fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<EntryIter> {
        let matched: Vec<Result<Segments>> = self
            .tree
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k != at)
            .filter_map(|(k, node)| {
                let rel = k.strip_prefix(at)?;
                let is_dir = matches!(node, Node::Dir);
                pattern.matches(rel.parts(), is_dir).then(|| Ok(k.clone()))
            })
            .collect();
        Ok(Box::new(matched.into_iter()))
    }

    fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn BlockingHandle>> {
        let existing = match self.node(at) {
            Some(Node::File(data)) => Some(data),
            Some(Node::Dir) => return Err(Error::validation("is a directory")),
            None => None,
        };
        if options.create_new && existing.is_some() {
            return Err(Error::AlreadyExists {
                key: at.to_string(),
            });
        }
        let data = match existing {
            Some(data) if !options.truncate => data,
            Some(_) => Vec::new(),
            None if options.create || options.create_new => Vec::new(),
            None => return Err(Error::not_found(at.to_string())),
        };
        let pos = if options.append { data.len() } else { 0 };
        let handle = MemHandle {
            tree: self.tree.clone(),
            key: at.clone(),
            data,
            pos,
            writable: options.write || options.append,
            closed: false,
        };
        if handle.writable {
            self.tree
                .lock()
                .unwrap()
                .insert(at.clone(), Node::File(handle.data.clone()));
        }
        Ok(Box::new(handle))
    }
}

pub struct MemHandle {
    tree: Tree,
    key: Segments,
    data: Vec<u8>,
    pos: usize,
    writable: bool,
    closed: bool,
}

impl BlockingHandle for MemHandle {
    fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        let end = match max {
            Some(n) => (self.pos + n).min(self.data.len()),
            None => self.data.len(),
        };
        let chunk = Bytes::copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(chunk)
    }

    fn write(&mut self, data: Bytes) -> Result<usize> {
        if !self.writable {
            return Err(Error::validation("not writable"));
        }
        self.data.truncate(self.pos);
        self.data.extend_from_slice(&data);
        self.pos = self.data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        if self.writable {
            self.tree
                .lock()
                .unwrap()
                .insert(self.key.clone(), Node::File(self.data.clone()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.flush()?;
            self.closed = true;
        }
        Ok(())
    }
}

/// Async-native adapter over the same in-memory tree.
pub struct AsyncMemAdapter {
    inner: MemAdapter,
}

impl AsyncMemAdapter {
    pub fn new(backend: Arc<MemBackend>) -> Self {
        AsyncMemAdapter {
            inner: MemAdapter::new(backend),
        }
    }
}

impl Adapter for AsyncMemAdapter {
    fn style(&self) -> &'static str {
        "mem-async"
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.inner.backend()
    }

    fn check_contained(&self, at: &Segments) -> Result<()> {
        self.inner.check_contained(at)
    }

    fn store_key(&self, at: &Segments) -> String {
        self.inner.store_key(at)
    }
}

#[async_trait]
impl AsyncOps for AsyncMemAdapter {
    async fn exists(&self, at: &Segments) -> Result<bool> {
        tokio::task::yield_now().await;
        self.inner.exists(at)
    }

    async fn is_file(&self, at: &Segments) -> Result<bool> {
        self.inner.is_file(at)
    }

    async fn is_dir(&self, at: &Segments) -> Result<bool> {
        self.inner.is_dir(at)
    }

    async fn stat(&self, at: &Segments) -> Result<Metadata> {
        self.inner.stat(at)
    }

    async fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()> {
        self.inner.mkdir(at, options)
    }

    async fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()> {
        self.inner.unlink(at, missing_ok)
    }

    async fn rmdir(&self, at: &Segments) -> Result<()> {
        self.inner.rmdir(at)
    }

    async fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        self.inner.rename(at, to)
    }

    async fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        self.inner.replace(at, to)
    }

    async fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()> {
        self.inner.touch(at, options)
    }

    async fn iterdir(&self, at: &Segments) -> Result<Listing> {
        Ok(Listing::from_results(self.inner.iterdir(at)?.collect()))
    }

    async fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<Listing> {
        Ok(Listing::from_results(self.inner.glob(at, pattern)?.collect()))
    }

    async fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn AsyncHandle>> {
        let handle = self.inner.open(at, options)?;
        Ok(Box::new(AsyncMemHandle { inner: handle }))
    }
}

struct AsyncMemHandle {
    inner: Box<dyn BlockingHandle>,
}

#[async_trait]
impl AsyncHandle for AsyncMemHandle {
    async fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        self.inner.read(max)
    }

    async fn write(&mut self, data: Bytes) -> Result<usize> {
        self.inner.write(data)
    }

    async fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
