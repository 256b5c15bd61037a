//! Segmentation scheduler.
//!
//! Runs one extraction per cut point against a job's resolved source and
//! records a [`SegmentResult`] for each. Two semaphores bound the work:
//! one caps jobs in flight, the other caps concurrent extractions across
//! all jobs.
//!
//! A segment failure never aborts its job. A job ends `Failed` only when a
//! precondition (source handle, artifact directory) prevents processing
//! from starting; otherwise it ends `Completed`, and clients tell good
//! segments from bad ones by their status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

use cutline_media::{ExtractRequest, MediaError, SegmentExtractor};
use cutline_models::{ArtifactRef, CutSpec, Job, JobId, JobStatus, SegmentResult, SourceHandle};
use cutline_queue::JobStore;
use cutline_storage::ArtifactStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::resolver::SourceResolver;

/// What a call to [`SegmentScheduler::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The job was processed and reached this terminal status.
    Executed(JobStatus),
    /// The job had already been claimed; nothing was done.
    Skipped(JobStatus),
}

/// Executes segmentation jobs.
pub struct SegmentScheduler {
    jobs: JobStore,
    resolver: Arc<SourceResolver>,
    artifacts: ArtifactStore,
    extractor: Arc<dyn SegmentExtractor>,
    job_permits: Arc<Semaphore>,
    segment_permits: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    segment_timeout: Duration,
}

impl SegmentScheduler {
    pub fn new(
        config: &WorkerConfig,
        jobs: JobStore,
        resolver: Arc<SourceResolver>,
        artifacts: ArtifactStore,
        extractor: Arc<dyn SegmentExtractor>,
    ) -> Self {
        Self {
            jobs,
            resolver,
            artifacts,
            extractor,
            job_permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            segment_permits: Arc::new(Semaphore::new(config.max_segment_parallel)),
            max_concurrent_jobs: config.max_concurrent_jobs,
            segment_timeout: config.segment_timeout,
        }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Register a queued job and start it in the background.
    pub async fn submit(self: &Arc<Self>, job: Job) -> JobId {
        let id = self.jobs.create(job).await;
        self.dispatch(id.clone());
        id
    }

    /// Spawn [`run`](Self::run) on the runtime and return immediately.
    pub fn dispatch(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = scheduler.run(&job_id).await {
                error!(job_id = %job_id, "Job run failed: {}", e);
            }
        })
    }

    /// Process a queued job to a terminal state.
    ///
    /// Calling this for a job that is already running or finished is a
    /// no-op returning [`RunOutcome::Skipped`].
    pub async fn run(&self, job_id: &JobId) -> WorkerResult<RunOutcome> {
        let current = self.jobs.get(job_id).await?.status;
        if current != JobStatus::Queued {
            debug!(job_id = %job_id, status = %current, "Job already claimed, skipping");
            return Ok(RunOutcome::Skipped(current));
        }

        let _permit = self
            .job_permits
            .acquire()
            .await
            .map_err(|_| WorkerError::job_failed("Scheduler is shut down"))?;

        if !self.jobs.try_start(job_id).await? {
            let status = self.jobs.get(job_id).await?.status;
            return Ok(RunOutcome::Skipped(status));
        }

        let job = self.jobs.get(job_id).await?;
        let logger = JobLogger::new(job_id, "segmentation");
        metrics::counter!("cutline_jobs_started_total").increment(1);
        metrics::gauge!("cutline_jobs_active").increment(1.0);

        let status = self
            .execute(&job, &logger)
            .instrument(logger.create_span())
            .await;

        metrics::gauge!("cutline_jobs_active").decrement(1.0);
        Ok(RunOutcome::Executed(status?))
    }

    async fn execute(&self, job: &Job, logger: &JobLogger) -> WorkerResult<JobStatus> {
        logger.log_start(&format!(
            "{} cut point(s), output {}",
            job.cut_specs.len(),
            job.output_kind
        ));

        let Some(handle) = self.resolver.get(&job.source_id).await else {
            return self
                .fail_job(job, logger, "Source is no longer available")
                .await;
        };

        if let Err(e) = self.artifacts.prepare_job(&job.id).await {
            return self
                .fail_job(job, logger, &format!("Could not prepare artifact storage: {}", e))
                .await;
        }

        let tasks = job
            .cut_specs
            .iter()
            .enumerate()
            .map(|(idx, cut)| self.run_segment(job, &handle, idx as u32 + 1, cut, logger));
        let recorded = join_all(tasks).await;

        self.artifacts.finish_job(&job.id).await;
        self.jobs.complete(&job.id).await?;

        let succeeded = recorded.iter().filter(|ok| **ok).count();
        metrics::counter!("cutline_jobs_completed_total").increment(1);
        if succeeded == 0 {
            logger.log_warning("no segment produced an artifact");
        }
        logger.log_completion(&format!(
            "{}/{} segments succeeded",
            succeeded,
            job.cut_specs.len()
        ));
        Ok(JobStatus::Completed)
    }

    async fn fail_job(&self, job: &Job, logger: &JobLogger, message: &str) -> WorkerResult<JobStatus> {
        logger.log_error(message);
        self.jobs.fail(&job.id, message).await?;
        metrics::counter!("cutline_jobs_failed_total").increment(1);
        Ok(JobStatus::Failed)
    }

    /// Extract one segment and record its result; returns whether it succeeded.
    async fn run_segment(
        &self,
        job: &Job,
        handle: &SourceHandle,
        ordinal: u32,
        cut: &CutSpec,
        logger: &JobLogger,
    ) -> bool {
        let result = match self.segment_permits.acquire().await {
            Ok(_permit) => self.extract(job, handle, ordinal, cut).await,
            Err(_) => SegmentResult::failed(ordinal, "Scheduler is shut down"),
        };

        let outcome = if result.is_success() { "succeeded" } else { "failed" };
        metrics::counter!("cutline_segments_total", "outcome" => outcome).increment(1);
        logger.log_segment(cut, &result);

        let success = result.is_success();
        if let Err(e) = self.jobs.append_segment_result(&job.id, result).await {
            logger.log_error(&format!("could not record segment {}: {}", ordinal, e));
            return false;
        }
        success
    }

    async fn extract(
        &self,
        job: &Job,
        handle: &SourceHandle,
        ordinal: u32,
        cut: &CutSpec,
    ) -> SegmentResult {
        if let Some(duration) = handle.duration_secs {
            if let Err(message) = cut.check_within(duration) {
                return SegmentResult::failed(ordinal, message);
            }
        }
        if !handle.supports(job.output_kind) {
            return SegmentResult::failed(
                ordinal,
                format!("Source has no {} stream", job.output_kind),
            );
        }

        let artifact = ArtifactRef::new(job.id.clone(), ordinal, job.output_kind);
        let request = ExtractRequest {
            input: handle.local_path.clone(),
            output: self.artifacts.staging_path(&artifact),
            start_secs: cut.start_secs,
            duration_secs: cut.duration_secs(),
            kind: job.output_kind,
            audio_kbps: job.quality.audio_kbps(),
            timeout_secs: self.segment_timeout.as_secs(),
        };

        let started = Instant::now();
        let extracted = match tokio::time::timeout(self.segment_timeout, self.extractor.extract(&request)).await {
            Ok(result) => result,
            Err(_) => Err(MediaError::Timeout(self.segment_timeout.as_secs())),
        };
        metrics::histogram!("cutline_segment_extraction_seconds", "kind" => job.output_kind.as_str())
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = extracted {
            self.artifacts.discard(&artifact).await;
            return SegmentResult::failed(ordinal, e.detail());
        }

        match self.artifacts.commit(&artifact).await {
            Ok(_) => SegmentResult::succeeded(artifact),
            Err(e) => {
                self.artifacts.discard(&artifact).await;
                SegmentResult::failed(ordinal, e.to_string())
            }
        }
    }

    /// Number of jobs currently holding an execution slot.
    pub fn active_jobs(&self) -> usize {
        self.max_concurrent_jobs - self.job_permits.available_permits()
    }

    /// Wait until every job has reached a terminal state, or `timeout`
    /// elapses.
    ///
    /// Jobs queued behind the concurrency limit count as unfinished.
    /// Returns `true` if the scheduler went idle.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            while self.active_jobs() > 0 || self.jobs.unfinished().await > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        let went_idle = tokio::time::timeout(timeout, idle).await.is_ok();
        if !went_idle {
            info!(
                active = self.active_jobs(),
                unfinished = self.jobs.unfinished().await,
                "Jobs still running at shutdown"
            );
        }
        went_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeExtractor, FakeFetcher, FakeProber, FAKE_MP4_HEAD};
    use cutline_models::{MediaKind, SegmentStatus, SourceId};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        scheduler: Arc<SegmentScheduler>,
        resolver: Arc<SourceResolver>,
        extractor: Arc<FakeExtractor>,
        artifacts: ArtifactStore,
    }

    fn harness_with(extractor: FakeExtractor, prober: FakeProber, tweak: impl FnOnce(&mut WorkerConfig)) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = WorkerConfig::with_work_dir(dir.path());
        tweak(&mut config);

        let resolver = Arc::new(SourceResolver::new(
            &config,
            Arc::new(FakeFetcher::default()),
            Arc::new(prober),
        ));
        let extractor = Arc::new(extractor);
        let artifacts = ArtifactStore::new(config.artifacts_dir());
        let scheduler = Arc::new(SegmentScheduler::new(
            &config,
            JobStore::new(),
            Arc::clone(&resolver),
            artifacts.clone(),
            extractor.clone(),
        ));
        Harness {
            _dir: dir,
            scheduler,
            resolver,
            extractor,
            artifacts,
        }
    }

    fn harness(extractor: FakeExtractor) -> Harness {
        harness_with(extractor, FakeProber::default(), |_| {})
    }

    async fn upload(h: &Harness) -> SourceId {
        let mut bytes = FAKE_MP4_HEAD.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        h.resolver
            .resolve_upload_bytes(&bytes, MediaKind::Video, None)
            .await
            .unwrap()
            .id
    }

    fn cuts(pairs: &[(f64, f64)]) -> Vec<CutSpec> {
        pairs.iter().map(|(s, e)| CutSpec::new(*s, *e).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_single_segment_job_completes() {
        let h = harness(FakeExtractor::default());
        let source = upload(&h).await;
        let id = h
            .scheduler
            .jobs()
            .create(Job::new(source, cuts(&[(0.0, 60.0)]), MediaKind::Video))
            .await;

        assert_eq!(h.scheduler.jobs().get(&id).await.unwrap().status, JobStatus::Queued);
        let outcome = h.scheduler.run(&id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Executed(JobStatus::Completed));

        let job = h.scheduler.jobs().get(&id).await.unwrap();
        assert_eq!(job.segments.len(), 1);
        let artifact = job.segments[0].artifact.clone().unwrap();
        assert!(h.artifacts.exists(&artifact).await);
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_segment_fails_alone() {
        let h = harness(FakeExtractor::default());
        let source = upload(&h).await;
        let id = h
            .scheduler
            .jobs()
            .create(Job::new(
                source,
                cuts(&[(0.0, 60.0), (3540.0, 3600.0)]),
                MediaKind::Video,
            ))
            .await;

        h.scheduler.run(&id).await.unwrap();
        let job = h.scheduler.jobs().get(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.segments[0].status, SegmentStatus::Succeeded);
        assert_eq!(job.segments[1].status, SegmentStatus::Failed);
        assert!(job.segments[1]
            .error_message
            .as_deref()
            .unwrap()
            .contains("exceeds source duration"));
        assert_eq!(h.extractor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_ordinals_follow_input_order() {
        let h = harness(FakeExtractor::failing_at(vec![20.0]));
        let source = upload(&h).await;
        let id = h
            .scheduler
            .jobs()
            .create(Job::new(
                source,
                cuts(&[(40.0, 50.0), (20.0, 30.0), (0.0, 10.0)]),
                MediaKind::Audio,
            ))
            .await;

        h.scheduler.run(&id).await.unwrap();
        let job = h.scheduler.jobs().get(&id).await.unwrap();

        let ordinals: Vec<u32> = job.segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert!(job.segments[0].is_success());
        assert!(!job.segments[1].is_success());
        assert!(job.segments[1].error_message.as_deref().unwrap().contains("Invalid data"));
        assert!(job.segments[2].is_success());
        assert!(job.output_files()[1].starts_with("clip_cut_3_"));
        assert!(job.output_files()[1].ends_with(".mp3"));
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let h = harness(FakeExtractor::default());
        let source = upload(&h).await;
        let id = h
            .scheduler
            .jobs()
            .create(Job::new(source, cuts(&[(0.0, 5.0), (5.0, 10.0)]), MediaKind::Video))
            .await;

        h.scheduler.run(&id).await.unwrap();
        let first = h.scheduler.jobs().get(&id).await.unwrap();
        let again = h.scheduler.run(&id).await.unwrap();

        assert_eq!(again, RunOutcome::Skipped(JobStatus::Completed));
        assert_eq!(h.extractor.call_count(), 2);
        assert_eq!(h.scheduler.jobs().get(&id).await.unwrap().segments, first.segments);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_runs_extract_once() {
        let h = harness(FakeExtractor::with_delay(Duration::from_millis(20)));
        let source = upload(&h).await;
        let id = h
            .scheduler
            .jobs()
            .create(Job::new(source, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;

        let (a, b) = tokio::join!(h.scheduler.run(&id), h.scheduler.run(&id));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, RunOutcome::Executed(_)))
                .count(),
            1
        );
        assert_eq!(h.extractor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_fails_job() {
        let h = harness(FakeExtractor::default());
        let source = upload(&h).await;
        h.resolver.evict(&source).await;

        let id = h
            .scheduler
            .jobs()
            .create(Job::new(source, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;
        let outcome = h.scheduler.run(&id).await.unwrap();

        assert_eq!(outcome, RunOutcome::Executed(JobStatus::Failed));
        let job = h.scheduler.jobs().get(&id).await.unwrap();
        assert!(job.segments.is_empty());
        assert!(job.error_message.is_some());
        assert_eq!(h.extractor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_video_from_audio_only_source_fails_segment() {
        let h = harness_with(FakeExtractor::default(), FakeProber::audio_only(120.0), |_| {});
        let mut bytes = FAKE_MP4_HEAD.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        let source = h
            .resolver
            .resolve_upload_bytes(&bytes, MediaKind::Audio, None)
            .await
            .unwrap()
            .id;

        let id = h
            .scheduler
            .jobs()
            .create(Job::new(source, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;
        h.scheduler.run(&id).await.unwrap();

        let job = h.scheduler.jobs().get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.segments[0].error_message.as_deref(), Some("Source has no video stream"));
    }

    #[tokio::test]
    async fn test_segment_timeout_recorded() {
        let h = harness_with(
            FakeExtractor::with_delay(Duration::from_secs(5)),
            FakeProber::default(),
            |c| c.segment_timeout = Duration::from_millis(50),
        );
        let source = upload(&h).await;
        let id = h
            .scheduler
            .jobs()
            .create(Job::new(source, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;

        h.scheduler.run(&id).await.unwrap();
        let job = h.scheduler.jobs().get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.segments[0].error_message.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_extraction_concurrency_is_bounded() {
        let h = harness_with(
            FakeExtractor::with_delay(Duration::from_millis(30)),
            FakeProber::default(),
            |c| c.max_segment_parallel = 2,
        );
        let source = upload(&h).await;
        let id = h
            .scheduler
            .jobs()
            .create(Job::new(
                source,
                cuts(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0), (3.0, 4.0), (4.0, 5.0)]),
                MediaKind::Video,
            ))
            .await;

        h.scheduler.run(&id).await.unwrap();
        assert_eq!(h.extractor.call_count(), 5);
        assert!(h.extractor.peak_concurrency() <= 2);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_isolated() {
        let h = harness(FakeExtractor::with_delay(Duration::from_millis(10)));
        let source_a = upload(&h).await;
        let source_b = upload(&h).await;

        let a = h
            .scheduler
            .submit(Job::new(source_a, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;
        let b = h
            .scheduler
            .submit(Job::new(source_b, cuts(&[(0.0, 5.0), (5.0, 9.0)]), MediaKind::Audio))
            .await;

        assert!(h.scheduler.wait_for_idle(Duration::from_secs(5)).await);

        let job_a = h.scheduler.jobs().get(&a).await.unwrap();
        let job_b = h.scheduler.jobs().get(&b).await.unwrap();
        assert_eq!(job_a.status, JobStatus::Completed);
        assert_eq!(job_b.status, JobStatus::Completed);
        assert_eq!(job_a.segments.len(), 1);
        assert_eq!(job_b.segments.len(), 2);
        assert!(job_b
            .segments
            .iter()
            .all(|s| s.artifact.as_ref().unwrap().job_id == b));
    }

    #[tokio::test]
    async fn test_wait_for_idle_counts_queued_jobs() {
        let h = harness_with(
            FakeExtractor::with_delay(Duration::from_millis(150)),
            FakeProber::default(),
            |config| config.max_concurrent_jobs = 1,
        );
        let source_a = upload(&h).await;
        let source_b = upload(&h).await;

        let a = h
            .scheduler
            .submit(Job::new(source_a, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;
        let b = h
            .scheduler
            .submit(Job::new(source_b, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;

        assert!(h.scheduler.wait_for_idle(Duration::from_secs(5)).await);
        assert_eq!(h.scheduler.jobs().get(&a).await.unwrap().status, JobStatus::Completed);
        assert_eq!(h.scheduler.jobs().get(&b).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_wait_for_idle_times_out_on_undispatched_job() {
        let h = harness(FakeExtractor::default());
        let source = upload(&h).await;
        h.scheduler
            .jobs()
            .create(Job::new(source, cuts(&[(0.0, 5.0)]), MediaKind::Video))
            .await;

        assert_eq!(h.scheduler.active_jobs(), 0);
        assert!(!h.scheduler.wait_for_idle(Duration::from_millis(250)).await);
    }
}
