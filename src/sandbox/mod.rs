//! Sandbox lifecycle: a process-wide singleton boot of the execution
//! environment, plus the filesystem/process surface it exposes.
//!
//! The handle guards a single outstanding boot: the first caller starts it,
//! concurrent callers clone the same shared future, and every waiter of a
//! failed attempt observes the same error. A failed attempt resets the
//! handle so a later call can retry.

pub mod local;

pub use local::LocalBackend;

use crate::error::{BootError, WorkspaceError};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A booted sandbox. Paths are slash-separated and relative to the sandbox
/// root; file writes are idempotent whole-file overwrites.
#[async_trait]
pub trait SandboxInstance: Send + Sync {
    async fn create_dir(&self, path: &str) -> Result<()>;
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;
    async fn remove(&self, path: &str) -> Result<()>;
    async fn spawn(&self, command: &str, args: &[String]) -> Result<ProcessHandle>;
    async fn teardown(&self) -> Result<()>;
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>>;
}

/// A running process inside the sandbox: an output byte stream, an exit
/// signal, and a kill switch.
pub struct ProcessHandle {
    pub output: ByteStream,
    pub exit: oneshot::Receiver<i32>,
    kill: CancellationToken,
}

impl ProcessHandle {
    pub fn new(output: ByteStream, exit: oneshot::Receiver<i32>, kill: CancellationToken) -> Self {
        Self { output, exit, kill }
    }

    /// Stop the process. Output delivery ends; the exit signal still fires.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    pub fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Discard remaining output and wait for the exit code.
    pub async fn wait(self) -> i32 {
        drop(self.output);
        self.exit.await.unwrap_or(-1)
    }
}

/// Adapt an mpsc receiver of output chunks into a `ByteStream`.
pub fn receiver_stream(rx: mpsc::Receiver<Bytes>) -> ByteStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok(chunk), rx))
    }))
}

type SharedBoot = Shared<BoxFuture<'static, Result<Arc<dyn SandboxInstance>, BootError>>>;

enum BootState {
    Idle,
    Booting { attempt: SharedBoot, generation: u64 },
    Ready(Arc<dyn SandboxInstance>),
}

/// Owned lifecycle of the singleton sandbox instance. Clone-cheap via `Arc`
/// and injected into the coordinator and terminal sessions.
pub struct SandboxHandle {
    backend: Arc<dyn SandboxBackend>,
    state: Mutex<BootState>,
    generation: AtomicU64,
}

impl SandboxHandle {
    pub fn new(backend: Arc<dyn SandboxBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(BootState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    /// The booted instance, booting it first if necessary. Concurrent calls
    /// share one boot attempt.
    pub async fn instance(&self) -> Result<Arc<dyn SandboxInstance>, BootError> {
        let (attempt, generation) = {
            let mut state = self.state.lock().expect("sandbox state lock");
            match &*state {
                BootState::Ready(instance) => return Ok(instance.clone()),
                BootState::Booting {
                    attempt,
                    generation,
                } => (attempt.clone(), *generation),
                BootState::Idle => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(generation, "booting sandbox");
                    let backend = self.backend.clone();
                    let attempt: SharedBoot =
                        async move { backend.boot().await.map_err(BootError::new) }
                            .boxed()
                            .shared();
                    *state = BootState::Booting {
                        attempt: attempt.clone(),
                        generation,
                    };
                    (attempt, generation)
                }
            }
        };

        let result = attempt.await;

        // Only the attempt that is still current may publish its outcome;
        // a teardown or re-boot in the meantime supersedes it.
        let mut state = self.state.lock().expect("sandbox state lock");
        if matches!(&*state, BootState::Booting { generation: current, .. } if *current == generation)
        {
            *state = match &result {
                Ok(instance) => BootState::Ready(instance.clone()),
                Err(err) => {
                    warn!(generation, error = %err, "sandbox boot failed");
                    BootState::Idle
                }
            };
        }
        result
    }

    /// The booted instance, or `None` when nothing is booted. Never boots.
    pub fn current(&self) -> Option<Arc<dyn SandboxInstance>> {
        match &*self.state.lock().expect("sandbox state lock") {
            BootState::Ready(instance) => Some(instance.clone()),
            _ => None,
        }
    }

    fn require_instance(&self) -> Result<Arc<dyn SandboxInstance>, WorkspaceError> {
        self.current()
            .ok_or_else(|| WorkspaceError::SandboxUnavailable("no booted instance".to_string()))
    }

    /// Idempotently create intermediate directories, then overwrite `path`.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let instance = self.require_instance()?;
        instance
            .write_file(path, content)
            .await
            .map_err(|err| WorkspaceError::SandboxUnavailable(err.to_string()))
    }

    pub async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        let instance = self.require_instance()?;
        instance
            .create_dir(path)
            .await
            .map_err(|err| WorkspaceError::SandboxUnavailable(err.to_string()))
    }

    pub async fn remove(&self, path: &str) -> Result<(), WorkspaceError> {
        let instance = self.require_instance()?;
        instance
            .remove(path)
            .await
            .map_err(|err| WorkspaceError::SandboxUnavailable(err.to_string()))
    }

    pub async fn spawn(
        &self,
        command: &str,
        args: &[String],
    ) -> Result<ProcessHandle, WorkspaceError> {
        let instance = self.require_instance()?;
        instance
            .spawn(command, args)
            .await
            .map_err(|err| WorkspaceError::SandboxUnavailable(err.to_string()))
    }

    /// Release the instance and reset boot state; the next `instance()` call
    /// boots fresh.
    pub async fn teardown(&self) {
        let previous = {
            let mut state = self.state.lock().expect("sandbox state lock");
            std::mem::replace(&mut *state, BootState::Idle)
        };
        if let BootState::Ready(instance) = previous {
            if let Err(err) = instance.teardown().await {
                warn!(error = %err, "sandbox teardown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, bail};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct MockInstance {
        writes: Mutex<Vec<(String, String)>>,
        torn_down: std::sync::atomic::AtomicBool,
    }

    impl MockInstance {
        fn new() -> Self {
            Self {
                writes: Mutex::new(Vec::new()),
                torn_down: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SandboxInstance for MockInstance {
        async fn create_dir(&self, _path: &str) -> Result<()> {
            Ok(())
        }
        async fn write_file(&self, path: &str, content: &str) -> Result<()> {
            self.writes
                .lock()
                .expect("writes lock")
                .push((path.to_string(), content.to_string()));
            Ok(())
        }
        async fn remove(&self, _path: &str) -> Result<()> {
            Ok(())
        }
        async fn spawn(&self, _command: &str, _args: &[String]) -> Result<ProcessHandle> {
            bail!("mock sandbox does not spawn")
        }
        async fn teardown(&self) -> Result<()> {
            self.torn_down.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockBackend {
        boots: AtomicUsize,
        fail_first: bool,
        boot_delay: Duration,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                boots: AtomicUsize::new(0),
                fail_first: false,
                boot_delay: Duration::from_millis(10),
            }
        }

        fn failing_first() -> Self {
            Self {
                fail_first: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl SandboxBackend for MockBackend {
        async fn boot(&self) -> Result<Arc<dyn SandboxInstance>> {
            let attempt = self.boots.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.boot_delay).await;
            if self.fail_first && attempt == 0 {
                return Err(anyhow!("boot exploded"));
            }
            Ok(Arc::new(MockInstance::new()))
        }
    }

    #[tokio::test]
    async fn test_concurrent_boots_share_one_attempt() {
        let backend = Arc::new(MockBackend::new());
        let handle = Arc::new(SandboxHandle::new(backend.clone()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { handle.instance().await }));
        }
        let mut instances = Vec::new();
        for task in tasks {
            instances.push(task.await.expect("join").expect("boot"));
        }

        assert_eq!(backend.boots.load(Ordering::SeqCst), 1);
        for instance in &instances[1..] {
            assert!(Arc::ptr_eq(&instances[0], instance));
        }
    }

    #[tokio::test]
    async fn test_boot_failure_reaches_all_waiters_and_allows_retry() {
        let backend = Arc::new(MockBackend::failing_first());
        let handle = Arc::new(SandboxHandle::new(backend.clone()));

        // join! interleaves the two futures, so both are waiting on the
        // same attempt before it resolves.
        let (first, second) = tokio::join!(handle.instance(), handle.instance());
        // Both waiters share the one failure, underlying cause intact.
        let Err(err) = first else {
            panic!("expected shared boot failure");
        };
        assert!(err.source_error().to_string().contains("boot exploded"));
        assert!(second.is_err());
        assert_eq!(backend.boots.load(Ordering::SeqCst), 1);

        // A later call retries and succeeds.
        handle.instance().await.expect("retry boots fresh");
        assert!(handle.current().is_some());
    }

    #[tokio::test]
    async fn test_write_file_without_boot_is_unavailable() {
        let handle = SandboxHandle::new(Arc::new(MockBackend::new()));
        let err = handle
            .write_file("index.js", "")
            .await
            .expect_err("not booted");
        assert!(matches!(err, WorkspaceError::SandboxUnavailable(_)));
    }

    #[tokio::test]
    async fn test_teardown_resets_and_next_call_reboots() {
        let backend = Arc::new(MockBackend::new());
        let handle = SandboxHandle::new(backend.clone());

        handle.instance().await.expect("first boot");
        assert!(handle.current().is_some());

        handle.teardown().await;
        assert!(handle.current().is_none());

        handle.instance().await.expect("reboot");
        assert_eq!(backend.boots.load(Ordering::SeqCst), 2);
    }
}
