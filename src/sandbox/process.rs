use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::{
    models::ExecutionLimits,
    sandbox::{LanguageSpec, RunSpec, SandboxBackend, SandboxResult, cleanup_dir, read_limited},
};

/// Runs submissions as local child processes in their own session, with
/// kernel rlimits standing in for a container. The filesystem story is a
/// throwaway scratch directory plus a cleared environment; deployments that
/// need a hard perimeter use the docker backend instead.
pub struct ProcessSandbox {
    scratch_root: PathBuf,
}

impl ProcessSandbox {
    pub fn new(scratch_root: PathBuf) -> Self {
        Self { scratch_root }
    }
}

#[async_trait]
impl SandboxBackend for ProcessSandbox {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute(&self, spec: RunSpec) -> anyhow::Result<SandboxResult> {
        let work_dir = self.scratch_root.join(super::scratch_dir_name(spec.id));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .context("failed to create scratch dir")?;

        // Teardown runs on every path, including backend errors.
        let result = run_in_dir(&work_dir, &spec).await;
        cleanup_dir(&work_dir).await;
        result
    }
}

async fn run_in_dir(work_dir: &Path, spec: &RunSpec) -> anyhow::Result<SandboxResult> {
    let lang = LanguageSpec::for_language(spec.language);
    let source_path = lang.source_path(work_dir);
    tokio::fs::write(&source_path, spec.code.as_bytes())
        .await
        .context("failed to write source file")?;

    let started = Instant::now();
    let (argv0, argv_rest) = lang
        .interpreter
        .split_first()
        .context("interpreter argv is empty")?;
    let mut cmd = Command::new(argv0);
    cmd.args(argv_rest);
    cmd.arg(&source_path);
    cmd.current_dir(work_dir);
    cmd.env_clear();
    cmd.env("PATH", "/usr/local/bin:/usr/bin:/bin");
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    apply_isolation(&mut cmd, &spec.limits);

    let mut child = cmd.spawn().context("failed to spawn interpreter")?;
    let child_pid = child.id();

    // Input lines are delivered in order, then the pipe closes so a program
    // reading past the supplied lines sees EOF instead of blocking forever.
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
        Ok(Err(err)) => return Err(err).context("interpreter wait failed"),
        Err(_) => {
            // Untrusted code may ignore signals or have forked; SIGKILL the
            // whole session before reaping our direct child.
            kill_process_group(child_pid);
            let _ = child.kill().await;
            (-1, true, true)
        }
    };

    let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
    let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();

    Ok(SandboxResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        signaled,
        timed_out,
        stdout_truncated,
        stderr_truncated,
        duration_ms: started.elapsed().as_millis(),
    })
}

/// RLIMIT_AS is deliberately absent: modern runtimes reserve large virtual
/// ranges they never commit, and RLIMIT_DATA bounds what is actually used.
#[cfg(unix)]
fn apply_isolation(cmd: &mut Command, limits: &ExecutionLimits) {
    let memory_bytes = limits.memory_mb.saturating_mul(1024 * 1024);
    let file_bytes = limits.max_file_size_bytes;
    let nproc = limits.max_processes;
    let cpu_secs = (limits.timeout_ms / 1000).saturating_mul(2).saturating_add(5);

    // SAFETY: only async-signal-safe calls (setsid, setrlimit) run between
    // fork and exec.
    unsafe {
        cmd.pre_exec(move || {
            if unsafe { libc::setsid() } == -1 {
                return Err(std::io::Error::last_os_error());
            }
            set_rlimit(libc::RLIMIT_DATA, memory_bytes)?;
            set_rlimit(libc::RLIMIT_CPU, cpu_secs)?;
            set_rlimit(libc::RLIMIT_FSIZE, file_bytes)?;
            set_rlimit(libc::RLIMIT_NPROC, nproc)?;
            set_rlimit(libc::RLIMIT_NOFILE, 256)?;
            set_rlimit(libc::RLIMIT_CORE, 0)?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_isolation(_cmd: &mut Command, _limits: &ExecutionLimits) {}

#[cfg(unix)]
fn set_rlimit(resource: libc::__rlimit_resource_t, limit: u64) -> std::io::Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: limit,
        rlim_max: limit,
    };
    // SAFETY: rlim is valid, resource is a valid constant.
    if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// A negative pid addresses the whole process group the child leads.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: plain syscall; a stale pgid at worst hits nothing.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
