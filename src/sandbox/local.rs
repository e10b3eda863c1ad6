//! Sandbox backend rooted in a local directory: files mirror under the
//! root, processes run with the root as their working directory.

use super::{receiver_stream, ProcessHandle, SandboxBackend, SandboxInstance};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const OUTPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUF_SIZE: usize = 4096;

pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxBackend for LocalBackend {
    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create sandbox root {}", self.root.display()))?;
        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .context("failed to canonicalize sandbox root")?;
        debug!(root = %canonical_root.display(), "local sandbox booted");
        Ok(Arc::new(LocalSandbox {
            root: canonical_root,
        }))
    }
}

struct LocalSandbox {
    root: PathBuf,
}

impl LocalSandbox {
    /// Confine a workspace path to the sandbox root. Absolute paths,
    /// backslashes and parent-dir segments are rejected outright.
    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        if path.starts_with('/') || path.contains('\\') {
            bail!("absolute or platform-specific path not allowed: {path}");
        }
        let relative = Path::new(path);
        for component in relative.components() {
            if matches!(component, Component::ParentDir) {
                bail!("path traversal detected: {path}");
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SandboxInstance for LocalSandbox {
    async fn create_dir(&self, path: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        tokio::fs::create_dir_all(resolved)
            .await
            .with_context(|| format!("failed to create directory {path}"))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create parent directories for {path}"))?;
        }
        tokio::fs::write(resolved, content)
            .await
            .with_context(|| format!("failed to write {path}"))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&resolved)
                .await
                .with_context(|| format!("failed to remove directory {path}")),
            Ok(_) => tokio::fs::remove_file(&resolved)
                .await
                .with_context(|| format!("failed to remove {path}")),
            // Removing something already gone is a no-op.
            Err(_) => Ok(()),
        }
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<ProcessHandle> {
        let mut child = Command::new(command)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {command}"))?;

        let mut stdout = child.stdout.take().context("child stdout not piped")?;
        let mut stderr = child.stderr.take().context("child stderr not piped")?;
        let (tx, rx) = mpsc::channel::<Bytes>(OUTPUT_CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();
        let kill = CancellationToken::new();
        let token = kill.clone();

        tokio::spawn(async move {
            let mut out_buf = [0u8; READ_BUF_SIZE];
            let mut err_buf = [0u8; READ_BUF_SIZE];
            let mut out_done = false;
            let mut err_done = false;

            while !(out_done && err_done) {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = child.start_kill();
                        break;
                    }
                    read = stdout.read(&mut out_buf), if !out_done => match read {
                        Ok(0) | Err(_) => out_done = true,
                        Ok(n) => {
                            if tx.send(Bytes::copy_from_slice(&out_buf[..n])).await.is_err() {
                                out_done = true;
                            }
                        }
                    },
                    read = stderr.read(&mut err_buf), if !err_done => match read {
                        Ok(0) | Err(_) => err_done = true,
                        Ok(n) => {
                            if tx.send(Bytes::copy_from_slice(&err_buf[..n])).await.is_err() {
                                err_done = true;
                            }
                        }
                    },
                }
            }
            drop(tx);

            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(_) => -1,
            };
            let _ = exit_tx.send(code);
        });

        Ok(ProcessHandle::new(receiver_stream(rx), exit_rx, kill))
    }

    async fn teardown(&self) -> Result<()> {
        // The mirror is ephemeral; dropping the directory releases it.
        if tokio::fs::metadata(&self.root).await.is_ok() {
            tokio::fs::remove_dir_all(&self.root)
                .await
                .context("failed to remove sandbox root")?;
        }
        Ok(())
    }
}
