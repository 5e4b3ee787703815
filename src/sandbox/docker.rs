use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::sandbox::{LanguageSpec, RunSpec, SandboxBackend, SandboxResult, cleanup_dir, read_limited};

/// Container-backed isolation: one throwaway container per request with no
/// network, a read-only rootfs, and the scratch dir mounted read-only at
/// /workspace. The docker CLI is driven the same way the process backend
/// drives the interpreter.
pub struct DockerSandbox {
    scratch_root: PathBuf,
}

impl DockerSandbox {
    pub fn new(scratch_root: PathBuf) -> anyhow::Result<Self> {
        Ok(Self { scratch_root })
    }
}

#[async_trait]
impl SandboxBackend for DockerSandbox {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn execute(&self, spec: RunSpec) -> anyhow::Result<SandboxResult> {
        let work_dir = self.scratch_root.join(super::scratch_dir_name(spec.id));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .context("failed to create scratch dir")?;

        let result = run_container(&work_dir, &spec).await;
        cleanup_dir(&work_dir).await;
        result
    }
}

async fn run_container(work_dir: &Path, spec: &RunSpec) -> anyhow::Result<SandboxResult> {
    let lang = LanguageSpec::for_language(spec.language);
    let source_path = lang.source_path(work_dir);
    tokio::fs::write(&source_path, spec.code.as_bytes())
        .await
        .context("failed to write source file")?;

    let container_name = format!("runbox-{}", spec.id.as_simple());
    let started = Instant::now();

    let mut cmd = Command::new("docker");
    cmd.args(["run", "--rm", "-i", "--name", &container_name]);
    cmd.args(["--network", "none", "--cap-drop", "ALL"]);
    cmd.args(["--security-opt", "no-new-privileges", "--read-only"]);
    cmd.arg("--memory")
        .arg(format!("{}m", spec.limits.memory_mb));
    cmd.arg("--cpus").arg(spec.limits.cpu_cores.to_string());
    cmd.arg("--pids-limit")
        .arg(spec.limits.max_processes.to_string());
    cmd.arg("-v")
        .arg(format!("{}:/workspace:ro", work_dir.display()));
    cmd.args(["--workdir", "/workspace", "--tmpfs", "/tmp:size=16m"]);
    cmd.arg(lang.docker_image);
    cmd.args(["sh", "-c", lang.docker_script]);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn docker run")?;

    if let Some(mut stdin) = child.stdin.take() {
        let bytes = spec.stdin.clone().into_bytes();
        tokio::spawn(async move {
            let _ = stdin.write_all(&bytes).await;
            let _ = stdin.shutdown().await;
        });
    }

    let stdout = child.stdout.take().context("missing stdout pipe")?;
    let stderr = child.stderr.take().context("missing stderr pipe")?;
    let cap = spec.limits.max_output_bytes;
    let stdout_task = tokio::spawn(async move { read_limited(stdout, cap).await });
    let stderr_task = tokio::spawn(async move { read_limited(stderr, cap).await });

    let wait_result =
        tokio::time::timeout(Duration::from_millis(spec.limits.timeout_ms), child.wait()).await;

    let (exit_code, signaled, timed_out) = match wait_result {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), status.code().is_none(), false),
        Ok(Err(err)) => {
            force_remove_container(&container_name).await;
            return Err(err).context("docker run wait failed");
        }
        Err(_) => {
            // Killing the CLI client does not stop the container; the
            // daemon has to tear it down.
            force_remove_container(&container_name).await;
            let _ = child.kill().await;
            (-1, true, true)
        }
    };

    let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
    let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    // The CLI prefixes its own failures (daemon unreachable, image pull
    // errors) with "docker:"; those are ours, not the submission's.
    if !timed_out && stderr.starts_with("docker:") {
        anyhow::bail!("docker run failed: {}", stderr.trim_end());
    }

    Ok(SandboxResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr,
        exit_code,
        signaled,
        timed_out,
        stdout_truncated,
        stderr_truncated,
        duration_ms: started.elapsed().as_millis(),
    })
}

async fn force_remove_container(name: &str) {
    match Command::new("docker")
        .args(["rm", "--force", name])
        .output()
        .await
    {
        Ok(out) if out.status.success() => {}
        Ok(out) => tracing::warn!(
            container = name,
            stderr = %String::from_utf8_lossy(&out.stderr),
            "container force-remove failed"
        ),
        Err(err) => {
            tracing::warn!(container = name, error = %err, "container force-remove failed")
        }
    }
}
