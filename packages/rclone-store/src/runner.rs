//! rclone command execution.
//!
//! Every remote operation is one rclone invocation. The [`RcloneRunner`]
//! trait sits between the adapter and the process so tests can answer
//! commands without the real executable.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use storeloc_core::{BlockingHandle, Error, Result};

use crate::cat::CatHandle;
use crate::RcloneOptions;

/// rclone exit code for "directory not found".
pub const EXIT_DIR_NOT_FOUND: i32 = 3;
/// rclone exit code for "file not found".
pub const EXIT_FILE_NOT_FOUND: i32 = 4;

/// Captured result of a finished rclone command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcloneOutput {
    pub args: Vec<String>,
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl RcloneOutput {
    /// Classify a non-zero exit for the object at `key`.
    pub fn check(self, key: &str) -> Result<RcloneOutput> {
        match classify_exit(self.status, &self.args, &self.stderr, key) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// `None` on success; otherwise the error for this exit code.
pub(crate) fn classify_exit(
    status: i32,
    args: &[String],
    stderr: &str,
    key: &str,
) -> Option<Error> {
    match status {
        0 => None,
        EXIT_DIR_NOT_FOUND | EXIT_FILE_NOT_FOUND => Some(Error::not_found(key)),
        _ => Some(Error::Io {
            key: key.to_string(),
            source: std::io::Error::other(format!(
                "rclone failed ({}): {}\n{}",
                status,
                args.join(" "),
                stderr.trim()
            )),
        }),
    }
}

/// Runs rclone commands.
pub trait RcloneRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// Non-zero exits are returned as values; callers decide what they
    /// mean through [`RcloneOutput::check`].
    fn run(&self, args: &[String]) -> Result<RcloneOutput>;

    /// Start a command and hand back its stdout as a readable handle.
    ///
    /// `key` names the object for errors raised while reading.
    fn stream(&self, args: &[String], key: &str) -> Result<Box<dyn BlockingHandle>>;
}

/// Runs the real executable, one process per call.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    exe: String,
    prefix: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(options: &RcloneOptions) -> Self {
        ProcessRunner {
            exe: options.rclone_exe.clone(),
            prefix: options.rclone_args.clone(),
            env: options.env.clone(),
            timeout: options
                .timeout_s
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64),
        }
    }

    fn locate(&self) -> Result<PathBuf> {
        which::which(&self.exe).map_err(|e| {
            Error::unavailable(format!(
                "rclone executable not found (looked for {:?}): {}",
                self.exe, e
            ))
        })
    }

    fn spawn(&self, args: &[String]) -> Result<(Child, Vec<String>)> {
        let exe = self.locate()?;
        let mut full = vec![exe.display().to_string()];
        full.extend(self.prefix.iter().cloned());
        full.extend(args.iter().cloned());

        tracing::debug!(command = %full.join(" "), "spawn rclone");
        let child = Command::new(&exe)
            .args(&self.prefix)
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::unavailable(format!("failed to start {}: {}", exe.display(), e)))?;
        Ok((child, full))
    }

    fn wait(&self, child: &mut Child, command: &[String]) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child
                .wait()
                .map_err(|e| Error::unavailable(format!("waiting for rclone: {}", e)));
        };
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::unavailable(format!(
                        "rclone timed out after {:?}: {}",
                        timeout,
                        command.join(" ")
                    )));
                }
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => return Err(Error::unavailable(format!("waiting for rclone: {}", e))),
            }
        }
    }
}

pub(crate) fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl RcloneRunner for ProcessRunner {
    fn run(&self, args: &[String]) -> Result<RcloneOutput> {
        let (mut child, command) = self.spawn(args)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child, &command);

        let stdout = stdout
            .join()
            .map_err(|_| Error::Bridge("rclone stdout reader panicked".to_string()))?;
        let stderr = stderr
            .join()
            .map_err(|_| Error::Bridge("rclone stderr reader panicked".to_string()))?;
        let status = status?;

        Ok(RcloneOutput {
            args: command,
            status: status.code().unwrap_or(-1),
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    fn stream(&self, args: &[String], key: &str) -> Result<Box<dyn BlockingHandle>> {
        let (child, command) = self.spawn(args)?;
        Ok(Box::new(CatHandle::new(child, command, key, self.timeout)))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Answers commands from a table keyed by the space-joined arguments.
    ///
    /// Unknown commands exit with code 3, like a missing directory.
    #[derive(Clone, Default)]
    pub struct MockRunner {
        responses: Arc<Mutex<HashMap<String, (i32, Vec<u8>, String)>>>,
        streams: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        recorded: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_json(self, command: &str, body: serde_json::Value) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(command.to_string(), (0, body.to_string().into_bytes(), String::new()));
            self
        }

        pub fn with_exit(self, command: &str, status: i32, stderr: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(command.to_string(), (status, Vec::new(), stderr.to_string()));
            self
        }

        pub fn with_stream(self, command: &str, data: &[u8]) -> Self {
            self.streams
                .lock()
                .unwrap()
                .insert(command.to_string(), data.to_vec());
            self
        }

        pub fn recorded(&self) -> Vec<String> {
            self.recorded
                .lock()
                .unwrap()
                .iter()
                .map(|args| args.join(" "))
                .collect()
        }
    }

    impl RcloneRunner for MockRunner {
        fn run(&self, args: &[String]) -> Result<RcloneOutput> {
            self.recorded.lock().unwrap().push(args.to_vec());
            let command = args.join(" ");
            let (status, stdout, stderr) = self
                .responses
                .lock()
                .unwrap()
                .get(&command)
                .cloned()
                .unwrap_or((EXIT_DIR_NOT_FOUND, Vec::new(), "directory not found".into()));
            Ok(RcloneOutput {
                args: args.to_vec(),
                status,
                stdout,
                stderr,
            })
        }

        fn stream(&self, args: &[String], key: &str) -> Result<Box<dyn BlockingHandle>> {
            self.recorded.lock().unwrap().push(args.to_vec());
            let command = args.join(" ");
            match self.streams.lock().unwrap().get(&command) {
                Some(data) => Ok(Box::new(MemoryHandle {
                    data: Bytes::from(data.clone()),
                })),
                None => Err(Error::not_found(key)),
            }
        }
    }

    struct MemoryHandle {
        data: Bytes,
    }

    impl BlockingHandle for MemoryHandle {
        fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
            let n = max.unwrap_or(self.data.len()).min(self.data.len());
            Ok(self.data.split_to(n))
        }

        fn write(&mut self, _data: Bytes) -> Result<usize> {
            Err(Error::read_only("mock", "write"))
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }
}
