//! I/O smoke test run by the local backend's self-test.
//!
//! Everything happens inside an isolated run directory,
//! `delete_me_tmp__io_smoketest/delete_me_tmp__run__{fuzz}__{pid}__{millis}`,
//! and every file name embeds `delete_me_tmp__{fuzz}__` so stray leftovers
//! are obvious. The run directory is removed when the test finishes.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use storeloc_core::CheckStatus;
use uuid::Uuid;

pub const SMOKE_DIR: &str = "delete_me_tmp__io_smoketest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeCheck {
    pub name: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    pub ok: bool,
    pub run_dir: PathBuf,
    pub fuzz: String,
    pub checks: Vec<SmokeCheck>,
}

impl SmokeReport {
    fn passed(&self, names: &[&str]) -> bool {
        names.iter().all(|name| {
            self.checks
                .iter()
                .any(|check| check.name == *name && check.ok)
        })
    }

    /// Fold the individual checks into the backend's four flags.
    pub fn check_status(&self) -> CheckStatus {
        CheckStatus {
            marker_file: self.passed(&["writable_dir"]),
            read: self.passed(&["small_text_roundtrip", "small_binary_roundtrip"]),
            write: self.passed(&[
                "append_semantics",
                "fsync_and_reopen",
                "random_access_writes",
                "atomic_replace",
            ]),
            sundry: self.passed(&["directory_ops", "concurrent_writes"]),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &SmokeCheck> {
        self.checks.iter().filter(|check| !check.ok)
    }
}

/// Sizes used by the heavier checks.
#[derive(Debug, Clone, Copy)]
pub struct SmokeSizes {
    pub binary_bytes: usize,
    pub random_access_bytes: u64,
    pub concurrent_files: usize,
    pub concurrent_bytes: usize,
}

impl Default for SmokeSizes {
    fn default() -> Self {
        SmokeSizes {
            binary_bytes: 256 * 1024,
            random_access_bytes: 1024 * 1024,
            concurrent_files: 6,
            concurrent_bytes: 256 * 1024,
        }
    }
}

pub struct SmokeTest {
    run_dir: PathBuf,
    fuzz: String,
    sizes: SmokeSizes,
    checks: Vec<SmokeCheck>,
}

impl SmokeTest {
    pub fn new(root: &Path) -> Self {
        Self::with_sizes(root, SmokeSizes::default())
    }

    pub fn with_sizes(root: &Path, sizes: SmokeSizes) -> Self {
        let fuzz = Uuid::new_v4().simple().to_string()[..12].to_string();
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let run_dir = root.join(SMOKE_DIR).join(format!(
            "delete_me_tmp__run__{}__{}__{}",
            fuzz,
            std::process::id(),
            millis
        ));
        SmokeTest {
            run_dir,
            fuzz,
            sizes,
            checks: Vec::new(),
        }
    }

    fn name(&self, stem: &str, ext: &str) -> PathBuf {
        self.run_dir
            .join(format!("delete_me_tmp__{}__{}{}", self.fuzz, stem, ext))
    }

    fn record(&mut self, name: &'static str, outcome: io::Result<bool>) {
        let check = match outcome {
            Ok(ok) => SmokeCheck {
                name,
                ok,
                error: (!ok).then(|| "content mismatch".to_string()),
            },
            Err(e) => SmokeCheck {
                name,
                ok: false,
                error: Some(e.to_string()),
            },
        };
        self.checks.push(check);
    }

    pub fn run(mut self) -> SmokeReport {
        let writable = self.writable_dir();
        let fatal = writable.is_err();
        self.record("writable_dir", writable);
        if !fatal {
            let outcome = self.small_text_roundtrip();
            self.record("small_text_roundtrip", outcome);
            let outcome = self.small_binary_roundtrip();
            self.record("small_binary_roundtrip", outcome);
            let outcome = self.append_semantics();
            self.record("append_semantics", outcome);
            let outcome = self.fsync_and_reopen();
            self.record("fsync_and_reopen", outcome);
            let outcome = self.random_access_writes();
            self.record("random_access_writes", outcome);
            let outcome = self.atomic_replace();
            self.record("atomic_replace", outcome);
            let outcome = self.directory_ops();
            self.record("directory_ops", outcome);
            let outcome = self.concurrent_writes();
            self.record("concurrent_writes", outcome);
        }
        self.cleanup();
        SmokeReport {
            ok: self.checks.iter().all(|check| check.ok),
            run_dir: self.run_dir,
            fuzz: self.fuzz,
            checks: self.checks,
        }
    }

    fn cleanup(&self) {
        if let Err(e) = fs::remove_dir_all(&self.run_dir) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(dir = %self.run_dir.display(), error = %e, "smoke test cleanup failed");
            }
        }
        // only succeeds once no other run is using it
        if let Some(parent) = self.run_dir.parent() {
            let _ = fs::remove_dir(parent);
        }
    }

    fn writable_dir(&self) -> io::Result<bool> {
        fs::create_dir_all(&self.run_dir)?;
        let scratch = self.name("scratch", ".txt");
        fs::write(&scratch, "ok")?;
        fs::remove_file(&scratch)?;
        Ok(true)
    }

    fn small_text_roundtrip(&self) -> io::Result<bool> {
        let path = self.name("hello", ".txt");
        let message = "hello local disk\n";
        fs::write(&path, message)?;
        Ok(fs::read_to_string(&path)? == message)
    }

    fn small_binary_roundtrip(&self) -> io::Result<bool> {
        let path = self.name("blob", ".bin");
        let data = noise(self.sizes.binary_bytes);
        fs::write(&path, &data)?;
        Ok(fs::read(&path)? == data)
    }

    fn append_semantics(&self) -> io::Result<bool> {
        let path = self.name("append", ".txt");
        fs::write(&path, "a\n")?;
        let mut file = fs::OpenOptions::new().append(true).open(&path)?;
        file.write_all(b"b\n")?;
        file.write_all(b"c\n")?;
        drop(file);
        Ok(fs::read_to_string(&path)? == "a\nb\nc\n")
    }

    fn fsync_and_reopen(&self) -> io::Result<bool> {
        let path = self.name("durable", ".bin");
        let data = noise(self.sizes.binary_bytes);
        let mut file = fs::File::create(&path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        Ok(fs::read(&path)? == data)
    }

    fn random_access_writes(&self) -> io::Result<bool> {
        let path = self.name("random_access", ".bin");
        let size = self.sizes.random_access_bytes.max(8192);
        let file = fs::File::create(&path)?;
        file.set_len(size)?;
        drop(file);

        let writes: Vec<(u64, Vec<u8>)> = vec![
            (0, b"HEAD".to_vec()),
            (1024, noise(64)),
            (size / 2, noise(4096)),
            (size - 4, b"TAIL".to_vec()),
        ];
        let mut file = fs::OpenOptions::new().read(true).write(true).open(&path)?;
        for (offset, blob) in &writes {
            file.seek(SeekFrom::Start(*offset))?;
            file.write_all(blob)?;
        }
        file.sync_all()?;

        for (offset, blob) in &writes {
            file.seek(SeekFrom::Start(*offset))?;
            let mut got = vec![0u8; blob.len()];
            file.read_exact(&mut got)?;
            if &got != blob {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn atomic_replace(&self) -> io::Result<bool> {
        let target = self.name("atomic_target", ".txt");
        let tmp = self.name("atomic_tmp", ".tmp");
        fs::write(&target, "old")?;
        fs::write(&tmp, "new")?;
        fs::rename(&tmp, &target)?;
        Ok(fs::read_to_string(&target)? == "new" && !tmp.exists())
    }

    fn directory_ops(&self) -> io::Result<bool> {
        let top = self.name("nested_dir", "");
        let dir = top.join("dir").join("structure");
        fs::create_dir_all(&dir)?;
        let a = dir.join(format!("delete_me_tmp__{}__a.txt", self.fuzz));
        let b = dir.join(format!("delete_me_tmp__{}__b.txt", self.fuzz));
        fs::write(&a, "A")?;
        fs::write(&b, "B")?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.path());
            }
        }
        names.sort();
        let ok = names == vec![a.clone(), b.clone()];

        fs::remove_file(&a)?;
        fs::remove_file(&b)?;
        fs::remove_dir(&dir)?;
        fs::remove_dir(top.join("dir"))?;
        fs::remove_dir(&top)?;
        Ok(ok)
    }

    fn concurrent_writes(&self) -> io::Result<bool> {
        let workers: Vec<_> = (0..self.sizes.concurrent_files)
            .map(|i| {
                let path = self.name(&format!("concurrent_{}", i), ".bin");
                let bytes = self.sizes.concurrent_bytes;
                thread::spawn(move || -> io::Result<bool> {
                    let data = noise(bytes);
                    let mut file = fs::File::create(&path)?;
                    for chunk in data.chunks(64 * 1024) {
                        file.write_all(chunk)?;
                    }
                    file.sync_all()?;
                    drop(file);
                    Ok(fs::read(&path)? == data)
                })
            })
            .collect();

        let mut ok = true;
        for worker in workers {
            match worker.join() {
                Ok(result) => ok &= result?,
                Err(_) => return Err(io::Error::other("concurrent writer panicked")),
            }
        }
        Ok(ok)
    }
}

/// Pseudo-random bytes; only needs to differ between runs and positions.
fn noise(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        out.extend_from_slice(Uuid::new_v4().as_bytes());
    }
    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small() -> SmokeSizes {
        SmokeSizes {
            binary_bytes: 4096,
            random_access_bytes: 16 * 1024,
            concurrent_files: 3,
            concurrent_bytes: 8192,
        }
    }

    #[test]
    fn test_smoke_passes_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let report = SmokeTest::with_sizes(dir.path(), small()).run();

        assert!(report.ok, "failures: {:?}", report.failures().collect::<Vec<_>>());
        assert_eq!(report.checks.len(), 9);
        assert!(report
            .run_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("delete_me_tmp__run__{}__", report.fuzz)));
        assert!(!report.run_dir.exists());
        assert!(!dir.path().join(SMOKE_DIR).exists());

        let status = report.check_status();
        assert!(status.marker_file && status.read && status.write && status.sundry);
    }

    #[test]
    fn test_unwritable_root_stops_after_first_check() {
        let dir = TempDir::new().unwrap();
        // a file where the run directory's parent should go
        fs::write(dir.path().join(SMOKE_DIR), "in the way").unwrap();

        let report = SmokeTest::with_sizes(dir.path(), small()).run();
        assert!(!report.ok);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].name, "writable_dir");
        assert!(report.checks[0].error.is_some());
        assert!(!report.check_status().marker_file);
    }
}
