//! Bounded polling of a remote render job.

use std::sync::Arc;
use std::time::Duration;

use slidecast_common::config::RemoteRenderConfig;
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::job::{RenderJob, RenderStatus};

use crate::backend::{CancelSignal, ProgressPhase, ProgressReporter};
use crate::remote::RenderApi;

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&RemoteRenderConfig::default())
    }
}

impl From<&RemoteRenderConfig> for SupervisorConfig {
    fn from(config: &RemoteRenderConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(config.poll_interval_secs.max(0.0)),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// Drives one [`RenderJob`] to a terminal state.
///
/// Waits `poll_interval` before each of at most `max_attempts` status
/// polls. A transport error on any poll ends supervision; the remote job is
/// never cancelled, only abandoned.
pub struct RenderJobSupervisor {
    api: Arc<dyn RenderApi>,
    config: SupervisorConfig,
}

impl RenderJobSupervisor {
    pub fn new(api: Arc<dyn RenderApi>, config: SupervisorConfig) -> Self {
        Self { api, config }
    }

    /// Poll until `job` is done (returns the result URL), failed, out of
    /// attempts or cancelled.
    pub async fn supervise(
        &self,
        job: &mut RenderJob,
        cancel: &CancelSignal,
        progress: &ProgressReporter,
    ) -> SlidecastResult<String> {
        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %job.id, attempt, "Render job supervision cancelled");
                    return Err(SlidecastError::Cancelled);
                }
            }

            let update = self.api.status(&job.id).await?;
            let status = job
                .observe(update)
                .map_err(|err| SlidecastError::remote_render(err.to_string()))?;
            tracing::debug!(job_id = %job.id, attempt, status = status.as_str(), "Render job polled");

            match status {
                RenderStatus::Done => {
                    let url = job.result_url().unwrap_or_default().to_string();
                    tracing::info!(job_id = %job.id, attempt, url = %url, "Render job done");
                    progress.report(ProgressPhase::RemoteRendering, 100.0);
                    return Ok(url);
                }
                RenderStatus::Failed => {
                    let message = job.error().unwrap_or_default().to_string();
                    tracing::warn!(job_id = %job.id, attempt, error = %message, "Render job failed");
                    return Err(SlidecastError::remote_render(message));
                }
                RenderStatus::Queued | RenderStatus::Rendering => {
                    progress.report(
                        ProgressPhase::RemoteRendering,
                        attempt as f64 / self.config.max_attempts as f64 * 100.0,
                    );
                }
            }
        }

        tracing::warn!(
            job_id = %job.id,
            attempts = self.config.max_attempts,
            status = job.status().as_str(),
            "Render job abandoned"
        );
        Err(SlidecastError::timeout(job.id.clone(), self.config.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RenderJobSpec;
    use slidecast_timeline_model::job::RemoteStatus;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted statuses, repeating the last one forever.
    struct ScriptedApi {
        script: Mutex<VecDeque<SlidecastResult<RemoteStatus>>>,
        last: Mutex<Option<RemoteStatus>>,
        polls: AtomicU32,
    }

    impl ScriptedApi {
        fn new(script: Vec<SlidecastResult<RemoteStatus>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                polls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl RenderApi for ScriptedApi {
        async fn submit(&self, _spec: &RenderJobSpec) -> SlidecastResult<String> {
            Ok("job-1".to_string())
        }

        async fn status(&self, _job_id: &str) -> SlidecastResult<RemoteStatus> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(status)) => {
                    *self.last.lock().unwrap() = Some(status.clone());
                    Ok(status)
                }
                Some(Err(err)) => Err(err),
                None => Ok(self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(RemoteStatus::queued)),
            }
        }
    }

    fn supervisor(api: Arc<ScriptedApi>, max_attempts: u32) -> RenderJobSupervisor {
        RenderJobSupervisor::new(
            api,
            SupervisorConfig {
                poll_interval: Duration::from_secs(10),
                max_attempts,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_after_rendering() {
        let api = ScriptedApi::new(vec![
            Ok(RemoteStatus::queued()),
            Ok(RemoteStatus::rendering()),
            Ok(RemoteStatus::done("https://cdn.test/out.mp4")),
        ]);
        let mut job = RenderJob::new("job-1");
        let url = supervisor(api.clone(), 30)
            .supervise(&mut job, &CancelSignal::never(), &ProgressReporter::disabled())
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/out.mp4");
        assert_eq!(job.status(), RenderStatus::Done);
        assert_eq!(api.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_after_two_rendering_polls() {
        let api = ScriptedApi::new(vec![
            Ok(RemoteStatus::rendering()),
            Ok(RemoteStatus::rendering()),
            Ok(RemoteStatus::failed("asset 2 could not be decoded")),
        ]);
        let mut job = RenderJob::new("job-1");
        let err = supervisor(api, 30)
            .supervise(&mut job, &CancelSignal::never(), &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert_eq!(job.status(), RenderStatus::Failed);
        match err {
            SlidecastError::RemoteRender { message } => {
                assert_eq!(message, "asset 2 could not be decoded")
            }
            other => panic!("expected remote render error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_time_out() {
        let api = ScriptedApi::new(vec![Ok(RemoteStatus::rendering())]);
        let mut job = RenderJob::new("job-1");
        let started = tokio::time::Instant::now();
        let err = supervisor(api.clone(), 5)
            .supervise(&mut job, &CancelSignal::never(), &ProgressReporter::disabled())
            .await
            .unwrap_err();
        match err {
            SlidecastError::Timeout { job_id, attempts } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(api.polls.load(Ordering::SeqCst), 5);
        assert!(started.elapsed() >= Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_on_first_poll_accepted() {
        let api = ScriptedApi::new(vec![Ok(RemoteStatus::done("https://cdn.test/x.mp4"))]);
        let mut job = RenderJob::new("job-1");
        let url = supervisor(api, 3)
            .supervise(&mut job, &CancelSignal::never(), &ProgressReporter::disabled())
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/x.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_rendering_is_implausible() {
        let api = ScriptedApi::new(vec![
            Ok(RemoteStatus::queued()),
            Ok(RemoteStatus::done("https://cdn.test/x.mp4")),
        ]);
        let mut job = RenderJob::new("job-1");
        let err = supervisor(api, 3)
            .supervise(&mut job, &CancelSignal::never(), &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "remote_render");
        assert!(err.to_string().contains("implausible"));
        assert_eq!(job.status(), RenderStatus::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_not_retried() {
        let api = ScriptedApi::new(vec![Err(SlidecastError::remote_render("HTTP 503"))]);
        let mut job = RenderJob::new("job-1");
        let err = supervisor(api.clone(), 3)
            .supervise(&mut job, &CancelSignal::never(), &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "remote_render");
        assert_eq!(api.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_polls() {
        let api = ScriptedApi::new(vec![Ok(RemoteStatus::rendering())]);
        let (handle, signal) = CancelSignal::new();
        handle.cancel();
        let mut job = RenderJob::new("job-1");
        let err = supervisor(api.clone(), 30)
            .supervise(&mut job, &signal, &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, SlidecastError::Cancelled));
        assert_eq!(api.polls.load(Ordering::SeqCst), 0);
    }
}
