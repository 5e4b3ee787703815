use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::models::{ExecutionLimits, Language};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    pub supported_languages: Vec<Language>,
    pub sandbox_backend: SandboxBackendKind,
    pub max_concurrency: usize,
    pub queue_depth: usize,
    pub queue_wait: Duration,
    pub limits: ExecutionLimits,
    pub max_code_bytes: usize,
    pub max_stdin_bytes: usize,
    pub scratch_root: PathBuf,
    pub log_level: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_parse("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080))),
            supported_languages: parse_languages(
                &env::var("SUPPORTED_LANGUAGES").unwrap_or_else(|_| "python".to_string()),
            ),
            sandbox_backend: env_parse("SANDBOX_BACKEND", SandboxBackendKind::Process),
            max_concurrency: env_parse("MAX_CONCURRENCY", 8usize).max(1),
            queue_depth: env_parse("QUEUE_DEPTH", 32usize),
            queue_wait: Duration::from_millis(env_parse("QUEUE_WAIT_MS", 2000u64)),
            limits: ExecutionLimits {
                cpu_cores: env_parse("DEFAULT_CPU_CORES", 0.5),
                memory_mb: env_parse("DEFAULT_MEMORY_MB", 256),
                timeout_ms: env_parse("DEFAULT_TIMEOUT_MS", 10_000),
                max_processes: env_parse("DEFAULT_MAX_PROCESSES", 32),
                max_file_size_bytes: env_parse("DEFAULT_MAX_FILE_SIZE_BYTES", 1024 * 1024),
                max_output_bytes: env_parse("DEFAULT_MAX_OUTPUT_BYTES", 64 * 1024),
            }
            .normalized(),
            max_code_bytes: env_parse("MAX_CODE_BYTES", 250_000usize),
            max_stdin_bytes: env_parse("MAX_STDIN_BYTES", 256_000usize),
            scratch_root: env::var("SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SandboxBackendKind {
    #[default]
    Process,
    Docker,
}

impl FromStr for SandboxBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "docker" => Ok(Self::Docker),
            _ => Err(format!("unsupported sandbox backend: {s}")),
        }
    }
}

fn parse_languages(input: &str) -> Vec<Language> {
    let mut languages: Vec<Language> = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|tag| tag.parse().ok())
        .collect();
    languages.dedup();
    if languages.is_empty() {
        languages.push(Language::Python);
    }
    languages
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::{SandboxBackendKind, parse_languages};
    use crate::models::Language;

    #[test]
    fn parses_language_csv_and_skips_unknown_tags() {
        assert_eq!(parse_languages("python"), vec![Language::Python]);
        assert_eq!(parse_languages(" python , cobol "), vec![Language::Python]);
    }

    #[test]
    fn empty_language_set_falls_back_to_python() {
        assert_eq!(parse_languages(""), vec![Language::Python]);
        assert_eq!(parse_languages("cobol"), vec![Language::Python]);
    }

    #[test]
    fn backend_kind_parses_known_values() {
        assert_eq!(
            "docker".parse::<SandboxBackendKind>().unwrap(),
            SandboxBackendKind::Docker
        );
        assert_eq!(
            "Process".parse::<SandboxBackendKind>().unwrap(),
            SandboxBackendKind::Process
        );
        assert!("firecracker".parse::<SandboxBackendKind>().is_err());
    }
}
