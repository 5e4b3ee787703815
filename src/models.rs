use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
}

impl Language {
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Python => "python",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(Self::Python),
            _ => Err(format!("unknown language tag: {s}")),
        }
    }
}

/// Body of `POST /run`. Unknown fields are ignored so older clients that
/// send extras keep working.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub code: String,
    #[serde(default)]
    pub input: String,
    pub language: String,
}

/// Wire-level outcome of one execution. Exactly one variant is ever
/// populated; the client distinguishes them solely by the presence of the
/// `error` key, so the two variants must never merge into one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Output { output: String },
    Error { error: String },
}

impl ExecutionResult {
    pub fn output(output: impl Into<String>) -> Self {
        Self::Output {
            output: output.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    pub cpu_cores: f32,
    pub memory_mb: u64,
    pub timeout_ms: u64,
    pub max_processes: u64,
    pub max_file_size_bytes: u64,
    pub max_output_bytes: usize,
}

impl ExecutionLimits {
    pub fn normalized(mut self) -> Self {
        self.cpu_cores = self.cpu_cores.clamp(0.1, 4.0);
        self.memory_mb = self.memory_mb.clamp(32, 8192);
        self.timeout_ms = self.timeout_ms.clamp(50, 120_000);
        self.max_processes = self.max_processes.clamp(1, 256);
        self.max_file_size_bytes = self.max_file_size_bytes.clamp(1024, 100 * 1024 * 1024);
        self.max_output_bytes = self.max_output_bytes.clamp(1024, 4 * 1024 * 1024);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecRequest, ExecutionLimits, ExecutionResult, Language};

    #[test]
    fn language_tag_parses_case_insensitively() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("Python".parse::<Language>().unwrap(), Language::Python);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn result_serializes_to_exactly_one_key() {
        let ok = serde_json::to_value(ExecutionResult::output("hi\n")).unwrap();
        let obj = ok.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["output"], "hi\n");

        let err = serde_json::to_value(ExecutionResult::error("boom")).unwrap();
        let obj = err.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["error"], "boom");
    }

    #[test]
    fn request_tolerates_missing_input_and_extra_fields() {
        let parsed: ExecRequest = serde_json::from_str(
            r#"{"code": "print(1)", "language": "python", "theme": "dark"}"#,
        )
        .unwrap();
        assert_eq!(parsed.code, "print(1)");
        assert_eq!(parsed.input, "");
    }

    #[test]
    fn normalizes_limits_to_safe_bounds() {
        let normalized = ExecutionLimits {
            cpu_cores: 0.01,
            memory_mb: 1,
            timeout_ms: 1,
            max_processes: 999,
            max_file_size_bytes: 1,
            max_output_bytes: 99_000_000,
        }
        .normalized();

        assert_eq!(normalized.cpu_cores, 0.1);
        assert_eq!(normalized.memory_mb, 32);
        assert_eq!(normalized.timeout_ms, 50);
        assert_eq!(normalized.max_processes, 256);
        assert_eq!(normalized.max_file_size_bytes, 1024);
        assert_eq!(normalized.max_output_bytes, 4 * 1024 * 1024);
    }
}
