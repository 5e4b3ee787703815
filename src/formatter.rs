use crate::{models::ExecutionResult, sandbox::SandboxResult};

pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Maps a raw sandbox outcome onto the wire result. Interpreter diagnostics
/// travel verbatim in `error`; the client renders them as-is.
pub fn format_result(result: &SandboxResult, timeout_ms: u64) -> ExecutionResult {
    if result.timed_out {
        return ExecutionResult::error(format!(
            "execution timed out ({}s limit)",
            timeout_ms.div_ceil(1000)
        ));
    }

    if result.exit_code == 0 {
        let mut output = result.stdout.clone();
        if result.stdout_truncated {
            output.push_str(TRUNCATION_MARKER);
        }
        return ExecutionResult::output(output);
    }

    if !result.stderr.is_empty() {
        let mut error = result.stderr.clone();
        if result.stderr_truncated {
            error.push_str(TRUNCATION_MARKER);
        }
        ExecutionResult::error(error)
    } else if result.signaled {
        ExecutionResult::error("process terminated by signal")
    } else {
        ExecutionResult::error(format!("process exited with code {}", result.exit_code))
    }
}
