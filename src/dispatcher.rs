use std::sync::Arc;

use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::EngineError,
    formatter::format_result,
    metrics::MetricsRegistry,
    models::{ExecRequest, ExecutionResult, Language},
    sandbox::{RunSpec, SandboxBackend},
};

/// Owns admission control and the sandbox backend. One call to `execute`
/// maps to at most one sandbox context; the caller suspends until the
/// outcome is known.
///
/// Admission is two semaphores: `queue_slots` bounds how many requests may
/// even wait (run slots + queue depth permits), `run_slots` bounds how many
/// execute at once. Overflow is rejected immediately, waiting is bounded by
/// the configured queue timeout, so the queue can never grow without limit.
pub struct Dispatcher {
    config: EngineConfig,
    sandbox: Arc<dyn SandboxBackend>,
    run_slots: Arc<Semaphore>,
    queue_slots: Arc<Semaphore>,
    metrics: Arc<MetricsRegistry>,
}

impl Dispatcher {
    pub fn new(
        config: EngineConfig,
        sandbox: Arc<dyn SandboxBackend>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let run_slots = Arc::new(Semaphore::new(config.max_concurrency));
        let queue_slots = Arc::new(Semaphore::new(config.max_concurrency + config.queue_depth));
        Self {
            config,
            sandbox,
            run_slots,
            queue_slots,
            metrics,
        }
    }

    pub async fn execute(&self, request: ExecRequest) -> Result<ExecutionResult, EngineError> {
        let language = self.resolve_language(&request.language)?;
        self.metrics.submitted();

        let queue_token = self.queue_slots.clone().try_acquire_owned().map_err(|_| {
            self.metrics.rejected();
            EngineError::Busy
        })?;
        self.metrics.enqueued();

        let permit = match tokio::time::timeout(
            self.config.queue_wait,
            self.run_slots.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                self.metrics.dequeued();
                return Err(EngineError::Infrastructure);
            }
            Err(_) => {
                self.metrics.dequeued();
                self.metrics.rejected();
                return Err(EngineError::Busy);
            }
        };
        self.metrics.dequeued();
        drop(queue_token);

        let id = Uuid::new_v4();
        let spec = RunSpec {
            id,
            language,
            code: request.code,
            stdin: request.input,
            limits: self.config.limits.clone(),
        };

        self.metrics.started();
        tracing::info!(
            execution_id = %id,
            language = language.tag(),
            backend = self.sandbox.name(),
            "starting execution"
        );

        let outcome = self.sandbox.execute(spec).await;
        drop(permit);
        self.metrics.finished();

        match outcome {
            Ok(result) => {
                if result.timed_out {
                    self.metrics.timed_out();
                    tracing::warn!(execution_id = %id, "execution timed out, context torn down");
                } else if result.exit_code == 0 {
                    self.metrics.succeeded();
                } else {
                    self.metrics.failed();
                }
                tracing::info!(
                    execution_id = %id,
                    exit_code = result.exit_code,
                    duration_ms = result.duration_ms as u64,
                    "execution finished"
                );
                Ok(format_result(&result, self.config.limits.timeout_ms))
            }
            Err(err) => {
                // Detail stays in server logs; the caller gets a fixed
                // message that exposes nothing about the host.
                self.metrics.failed();
                tracing::error!(execution_id = %id, error = %err, "sandbox backend failed");
                Err(EngineError::Infrastructure)
            }
        }
    }

    fn resolve_language(&self, tag: &str) -> Result<Language, EngineError> {
        let language: Language = tag
            .parse()
            .map_err(|_| EngineError::UnsupportedLanguage(tag.to_string()))?;
        if !self.config.supported_languages.contains(&language) {
            return Err(EngineError::UnsupportedLanguage(tag.to_string()));
        }
        Ok(language)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::Dispatcher;
    use crate::{
        config::{EngineConfig, SandboxBackendKind},
        error::EngineError,
        metrics::MetricsRegistry,
        models::{ExecRequest, ExecutionLimits, ExecutionResult, Language},
        sandbox::{RunSpec, SandboxBackend, SandboxResult},
    };

    fn test_config() -> EngineConfig {
        EngineConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            supported_languages: vec![Language::Python],
            sandbox_backend: SandboxBackendKind::Process,
            max_concurrency: 1,
            queue_depth: 0,
            queue_wait: Duration::ZERO,
            limits: ExecutionLimits {
                cpu_cores: 0.5,
                memory_mb: 256,
                timeout_ms: 10_000,
                max_processes: 32,
                max_file_size_bytes: 1024 * 1024,
                max_output_bytes: 64 * 1024,
            },
            max_code_bytes: 250_000,
            max_stdin_bytes: 256_000,
            scratch_root: std::env::temp_dir(),
            log_level: "info".to_string(),
        }
    }

    fn request(language: &str) -> ExecRequest {
        ExecRequest {
            code: "print(1)".to_string(),
            input: String::new(),
            language: language.to_string(),
        }
    }

    fn ok_result() -> SandboxResult {
        SandboxResult {
            stdout: "1\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            signaled: false,
            timed_out: false,
            stdout_truncated: false,
            stderr_truncated: false,
            duration_ms: 1,
        }
    }

    struct CannedBackend {
        calls: AtomicUsize,
        result: SandboxResult,
    }

    #[async_trait]
    impl SandboxBackend for CannedBackend {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn execute(&self, _spec: RunSpec) -> anyhow::Result<SandboxResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    struct BlockingBackend {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SandboxBackend for BlockingBackend {
        fn name(&self) -> &'static str {
            "blocking"
        }

        async fn execute(&self, _spec: RunSpec) -> anyhow::Result<SandboxResult> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ok_result())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl SandboxBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn execute(&self, _spec: RunSpec) -> anyhow::Result<SandboxResult> {
            anyhow::bail!("scratch volume is gone")
        }
    }

    #[tokio::test]
    async fn unsupported_language_fails_fast_without_a_sandbox() {
        let backend = Arc::new(CannedBackend {
            calls: AtomicUsize::new(0),
            result: ok_result(),
        });
        let dispatcher = Dispatcher::new(
            test_config(),
            backend.clone(),
            Arc::new(MetricsRegistry::new()),
        );

        let err = dispatcher.execute(request("cobol")).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLanguage(tag) if tag == "cobol"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_run_returns_output_variant() {
        let backend = Arc::new(CannedBackend {
            calls: AtomicUsize::new(0),
            result: ok_result(),
        });
        let dispatcher =
            Dispatcher::new(test_config(), backend, Arc::new(MetricsRegistry::new()));

        let result = dispatcher.execute(request("python")).await.unwrap();
        assert_eq!(result, ExecutionResult::output("1\n"));
    }

    #[tokio::test]
    async fn saturated_pool_rejects_instead_of_queueing_forever() {
        let backend = Arc::new(BlockingBackend {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let metrics = Arc::new(MetricsRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(test_config(), backend.clone(), metrics));

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.execute(request("python")).await })
        };
        backend.entered.notified().await;

        let err = dispatcher.execute(request("python")).await.unwrap_err();
        assert!(matches!(err, EngineError::Busy));

        backend.release.notify_one();
        let result = first.await.unwrap().unwrap();
        assert_eq!(result, ExecutionResult::output("1\n"));

        // The slot freed by the first run admits the next request.
        backend.release.notify_one();
        let again = dispatcher.execute(request("python")).await.unwrap();
        assert_eq!(again, ExecutionResult::output("1\n"));
    }

    #[tokio::test]
    async fn backend_failure_is_contained_as_infrastructure_error() {
        let dispatcher = Dispatcher::new(
            test_config(),
            Arc::new(FailingBackend),
            Arc::new(MetricsRegistry::new()),
        );

        let err = dispatcher.execute(request("python")).await.unwrap_err();
        assert!(matches!(err, EngineError::Infrastructure));
    }

    #[tokio::test]
    async fn timeout_outcome_becomes_fixed_error_text() {
        let backend = Arc::new(CannedBackend {
            calls: AtomicUsize::new(0),
            result: SandboxResult {
                timed_out: true,
                exit_code: -1,
                signaled: true,
                ..ok_result()
            },
        });
        let dispatcher =
            Dispatcher::new(test_config(), backend, Arc::new(MetricsRegistry::new()));

        let result = dispatcher.execute(request("python")).await.unwrap();
        assert_eq!(
            result,
            ExecutionResult::error("execution timed out (10s limit)")
        );
    }
}
