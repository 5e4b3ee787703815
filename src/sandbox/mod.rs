mod docker;
mod language;
mod process;

use std::{
    path::Path,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::{
    config::{EngineConfig, SandboxBackendKind},
    models::{ExecutionLimits, Language},
};

pub use docker::DockerSandbox;
pub use language::LanguageSpec;
pub use process::ProcessSandbox;

/// Everything a backend needs to run one submission. Owned by the backend
/// for the duration of a single `execute` call; nothing is reused across
/// requests.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub id: uuid::Uuid,
    pub language: Language,
    pub code: String,
    pub stdin: String,
    pub limits: ExecutionLimits,
}

#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub signaled: bool,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration_ms: u128,
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, spec: RunSpec) -> anyhow::Result<SandboxResult>;
}

pub struct SandboxFactory;

impl SandboxFactory {
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Arc<dyn SandboxBackend>> {
        match config.sandbox_backend {
            SandboxBackendKind::Process => {
                Ok(Arc::new(ProcessSandbox::new(config.scratch_root.clone())))
            }
            SandboxBackendKind::Docker => {
                Ok(Arc::new(DockerSandbox::new(config.scratch_root.clone())?))
            }
        }
    }
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Unique scratch directory name for one run. Contexts are never shared, so
/// a collision-free name is all the separation the filesystem needs.
fn scratch_dir_name(id: uuid::Uuid) -> String {
    format!("run-{}-{}", id.as_simple(), now_nanos())
}

async fn cleanup_dir(path: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(path).await {
        tracing::warn!(path = %path.display(), error = %err, "scratch dir cleanup failed");
    }
}

/// Drains a stream to EOF, retaining at most `limit` bytes. The child keeps
/// a writable pipe either way, so a chatty program can never wedge itself on
/// a full pipe or grow our memory unbounded. Returns the retained bytes and
/// whether anything beyond the cap was dropped.
async fn read_limited<R>(mut reader: R, limit: usize) -> (Vec<u8>, bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut out = Vec::with_capacity(limit.min(8192));
    let mut truncated = false;
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if out.len() < limit {
                    let remaining = limit - out.len();
                    out.extend_from_slice(&chunk[..remaining.min(n)]);
                    if n > remaining {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (out, truncated)
}
