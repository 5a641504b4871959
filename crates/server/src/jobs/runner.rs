// crates/server/src/jobs/runner.rs
//! Central job runner that owns every upload's lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shapefiley_core::{
    job_name_from_filename, ArchiveStore, ConversionError, ConversionRunner, IntakeError,
    JobStatus, Shapefile,
};
use shapefiley_db::JobRecordStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::types::StatusChange;

/// Creates jobs and drives each one through exactly one conversion.
///
/// Thread-safe via `Arc` wrapping. `create_job` records the job and its
/// archive; `start_conversion` spawns the background task that is the only
/// writer of the job's terminal status.
pub struct JobRunner {
    store: Arc<dyn JobRecordStore>,
    archives: ArchiveStore,
    converter: Arc<dyn ConversionRunner>,
    active: Arc<AtomicUsize>,
    status_tx: broadcast::Sender<StatusChange>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        archives: ArchiveStore,
        converter: Arc<dyn ConversionRunner>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(256);
        Self {
            store,
            archives,
            converter,
            active: Arc::new(AtomicUsize::new(0)),
            status_tx,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobRecordStore> {
        &self.store
    }

    /// Record a new `started` job and persist its archive.
    ///
    /// The id is assigned before anything touches disk, and the archive is
    /// stored as `<id>_<filename>`. If the archive cannot be written or its
    /// path cannot be recorded, the half-created record is discarded and no
    /// job exists.
    pub async fn create_job(
        &self,
        filename: &str,
        archive: &[u8],
    ) -> Result<Shapefile, IntakeError> {
        let name = job_name_from_filename(filename).ok_or_else(|| IntakeError::InvalidFilename {
            filename: filename.to_string(),
        })?;

        let mut job = self
            .store
            .create(&name)
            .await
            .map_err(|e| IntakeError::Store(e.to_string()))?;
        tracing::info!(job_id = job.id, name = %job.name, size = archive.len(), "Job created");

        let attached = match self.archives.persist(job.id, filename, archive).await {
            Ok(path) => self
                .store
                .set_archive_path(job.id, &path)
                .await
                .map(|()| path)
                .map_err(|e| IntakeError::Store(e.to_string())),
            Err(e) => Err(e),
        };

        match attached {
            Ok(path) => {
                job.archive_path = Some(path);
                Ok(job)
            }
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Intake failed, discarding job");
                if let Err(discard_err) = self.store.discard(job.id).await {
                    tracing::error!(job_id = job.id, error = %discard_err, "Failed to discard job");
                }
                Err(e)
            }
        }
    }

    /// Spawn the single conversion attempt for `job`.
    ///
    /// Returns immediately. The handle resolves to `Some(status)` once that
    /// status has been written, or `None` when nothing was written (the job
    /// had already left `started`, or the store failed). Dropping the handle
    /// does not affect the conversion.
    pub fn start_conversion(&self, job: Shapefile) -> JoinHandle<Option<JobStatus>> {
        let store = Arc::clone(&self.store);
        let converter = Arc::clone(&self.converter);
        let status_tx = self.status_tx.clone();
        let active = ActiveGuard::enter(&self.active);

        tokio::spawn(async move {
            let _active = active;
            tracing::info!(job_id = job.id, name = %job.name, "Waiting for conversion to finish");
            let outcome = match job.archive_path.as_deref() {
                Some(path) => converter.run(path, &job.name).await,
                None => Err(ConversionError::MissingArchive),
            };

            let status = match outcome {
                Ok(()) => JobStatus::Finished,
                Err(e) => {
                    tracing::warn!(job_id = job.id, name = %job.name, error = %e, "Conversion failed");
                    JobStatus::Failed
                }
            };

            match store.finish(job.id, status).await {
                Ok(true) => {
                    tracing::info!(job_id = job.id, %status, "Job status updated");
                    let _ = status_tx.send(StatusChange {
                        job_id: job.id,
                        name: job.name.clone(),
                        status,
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    });
                    Some(status)
                }
                Ok(false) => {
                    tracing::warn!(job_id = job.id, %status, "Job was no longer started, status left unchanged");
                    None
                }
                Err(e) => {
                    tracing::error!(job_id = job.id, %status, error = %e, "Failed to record job status");
                    None
                }
            }
        })
    }

    /// Subscribe to terminal status changes of all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.status_tx.subscribe()
    }

    /// Number of conversions currently running.
    pub fn active_conversions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Counts one running conversion for as long as it lives, including when
/// the conversion task panics.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shapefiley_core::ScriptRunner;
    use shapefiley_db::{Database, DbError, DbResult};
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::{Barrier, Semaphore};

    /// Conversion that blocks until the test releases a permit.
    struct GatedRunner {
        gate: Arc<Semaphore>,
        succeed: bool,
    }

    #[async_trait]
    impl ConversionRunner for GatedRunner {
        async fn run(&self, _archive: &Path, _name: &str) -> Result<(), ConversionError> {
            let _permit = self.gate.acquire().await.expect("gate closed");
            if self.succeed {
                Ok(())
            } else {
                Err(ConversionError::Exited {
                    code: Some(1),
                    stderr: "boom".to_string(),
                })
            }
        }
    }

    struct BarrierRunner(Arc<Barrier>);

    #[async_trait]
    impl ConversionRunner for BarrierRunner {
        async fn run(&self, _archive: &Path, _name: &str) -> Result<(), ConversionError> {
            self.0.wait().await;
            Ok(())
        }
    }

    /// Store whose writes all fail.
    struct BrokenStore;

    #[async_trait]
    impl JobRecordStore for BrokenStore {
        async fn create(&self, _name: &str) -> DbResult<Shapefile> {
            Err(DbError::Sqlx(sqlx_unavailable()))
        }
        async fn set_archive_path(&self, _id: i64, _path: &Path) -> DbResult<()> {
            Err(DbError::Sqlx(sqlx_unavailable()))
        }
        async fn finish(&self, _id: i64, _status: JobStatus) -> DbResult<bool> {
            Err(DbError::Sqlx(sqlx_unavailable()))
        }
        async fn get(&self, _id: i64) -> DbResult<Option<Shapefile>> {
            Ok(None)
        }
        async fn discard(&self, _id: i64) -> DbResult<()> {
            Ok(())
        }
    }

    struct PanickingRunner;

    #[async_trait]
    impl ConversionRunner for PanickingRunner {
        async fn run(&self, _archive: &Path, _name: &str) -> Result<(), ConversionError> {
            panic!("converter blew up");
        }
    }

    fn started_job(id: i64) -> Shapefile {
        Shapefile {
            id,
            name: "parcels".to_string(),
            status: JobStatus::Started,
            archive_path: Some(std::path::PathBuf::from("/tmp/shapefiley/1_parcels.zip")),
            created_at: chrono::Utc::now(),
        }
    }

    fn sqlx_unavailable() -> shapefiley_db::SqlxError {
        shapefiley_db::SqlxError::PoolClosed
    }

    async fn runner_with(
        converter: Arc<dyn ConversionRunner>,
    ) -> (JobRunner, Arc<Database>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::new_in_memory().await.unwrap());
        let runner = JobRunner::new(db.clone(), ArchiveStore::new(tmp.path()), converter);
        (runner, db, tmp)
    }

    #[tokio::test]
    async fn test_create_job_is_started_with_archive() {
        let gate = Arc::new(Semaphore::new(0));
        let (runner, db, tmp) = runner_with(Arc::new(GatedRunner { gate, succeed: true })).await;

        let job = runner.create_job("parcels.zip", b"PK").await.unwrap();

        assert_eq!(job.id, 1);
        assert_eq!(job.name, "parcels");
        assert_eq!(job.status, JobStatus::Started);
        assert_eq!(job.archive_path.as_deref(), Some(tmp.path().join("1_parcels.zip").as_path()));

        let stored = db.get_shapefile(job.id).await.unwrap().unwrap();
        assert_eq!(stored.archive_path, job.archive_path);
    }

    #[tokio::test]
    async fn test_status_is_started_until_conversion_completes() {
        let gate = Arc::new(Semaphore::new(0));
        let (runner, db, _tmp) =
            runner_with(Arc::new(GatedRunner { gate: gate.clone(), succeed: true })).await;

        let job = runner.create_job("parcels.zip", b"PK").await.unwrap();
        let handle = runner.start_conversion(job.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stored = db.get_shapefile(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Started);
        assert_eq!(runner.active_conversions(), 1);

        gate.add_permits(1);
        assert_eq!(handle.await.unwrap(), Some(JobStatus::Finished));

        let stored = db.get_shapefile(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Finished);
        assert_eq!(runner.active_conversions(), 0);
    }

    #[tokio::test]
    async fn test_failed_conversion_marks_failed() {
        let gate = Arc::new(Semaphore::new(1));
        let (runner, db, _tmp) = runner_with(Arc::new(GatedRunner { gate, succeed: false })).await;

        let job = runner.create_job("parcels.zip", b"PK").await.unwrap();
        assert_eq!(runner.start_conversion(job.clone()).await.unwrap(), Some(JobStatus::Failed));

        let stored = db.get_shapefile(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_failed() {
        let converter = Arc::new(ScriptRunner::new("/nonexistent/worker.sh"));
        let (runner, db, _tmp) = runner_with(converter).await;

        let job = runner.create_job("parcels.zip", b"PK").await.unwrap();
        assert_eq!(runner.start_conversion(job.clone()).await.unwrap(), Some(JobStatus::Failed));
        assert_eq!(
            db.get_shapefile(job.id).await.unwrap().unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_script_runner_receives_persisted_archive() {
        let converter = Arc::new(
            ScriptRunner::new("/bin/sh").with_args(["-c", r#"test -f "$1" && test "$2" = roads"#, "worker"]),
        );
        let (runner, _db, _tmp) = runner_with(converter).await;

        let job = runner.create_job("roads.zip", b"PK").await.unwrap();
        assert_eq!(runner.start_conversion(job).await.unwrap(), Some(JobStatus::Finished));
    }

    #[tokio::test]
    async fn test_status_transitions_only_once() {
        let gate = Arc::new(Semaphore::new(2));
        let (runner, db, _tmp) = runner_with(Arc::new(GatedRunner { gate, succeed: false })).await;

        let job = runner.create_job("parcels.zip", b"PK").await.unwrap();
        db.finish_shapefile(job.id, JobStatus::Finished).await.unwrap();

        // A second writer cannot move a terminal job.
        assert_eq!(runner.start_conversion(job.clone()).await.unwrap(), None);
        assert_eq!(
            db.get_shapefile(job.id).await.unwrap().unwrap().status,
            JobStatus::Finished
        );
    }

    #[tokio::test]
    async fn test_missing_archive_path_fails_job() {
        let gate = Arc::new(Semaphore::new(1));
        let (runner, db, _tmp) = runner_with(Arc::new(GatedRunner { gate, succeed: true })).await;

        let mut job = runner.create_job("parcels.zip", b"PK").await.unwrap();
        job.archive_path = None;
        assert_eq!(runner.start_conversion(job.clone()).await.unwrap(), Some(JobStatus::Failed));
        assert_eq!(
            db.get_shapefile(job.id).await.unwrap().unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_archive_write_failure_discards_job() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let db = Arc::new(Database::new_in_memory().await.unwrap());
        let gate = Arc::new(Semaphore::new(0));
        let runner = JobRunner::new(
            db.clone(),
            ArchiveStore::new(&blocker),
            Arc::new(GatedRunner { gate, succeed: true }),
        );

        assert!(runner.create_job("parcels.zip", b"PK").await.is_err());
        assert!(db.get_shapefile(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_intake_error() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let runner = JobRunner::new(
            Arc::new(BrokenStore),
            ArchiveStore::new(tmp.path()),
            Arc::new(GatedRunner { gate, succeed: true }),
        );

        let err = runner.create_job("parcels.zip", b"PK").await.unwrap_err();
        assert!(matches!(err, IntakeError::Store(_)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_filename_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let (runner, db, _tmp) = runner_with(Arc::new(GatedRunner { gate, succeed: true })).await;

        let err = runner.create_job(".zip", b"PK").await.unwrap_err();
        assert!(matches!(err, IntakeError::InvalidFilename { .. }));
        assert!(db.get_shapefile(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jobs_convert_in_parallel() {
        const JOBS: usize = 4;
        let barrier = Arc::new(Barrier::new(JOBS));
        let (runner, db, _tmp) = runner_with(Arc::new(BarrierRunner(barrier))).await;

        let mut handles = Vec::new();
        for i in 0..JOBS {
            let job = runner.create_job(&format!("layer{i}.zip"), b"PK").await.unwrap();
            handles.push(runner.start_conversion(job));
        }

        // Every conversion waits on the others, so this only finishes if they
        // all run at the same time.
        for handle in handles {
            let status = tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("conversions should run concurrently")
                .unwrap();
            assert_eq!(status, Some(JobStatus::Finished));
        }
        for id in 1..=JOBS as i64 {
            assert_eq!(
                db.get_shapefile(id).await.unwrap().unwrap().status,
                JobStatus::Finished
            );
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_terminal_status() {
        let gate = Arc::new(Semaphore::new(1));
        let (runner, _db, _tmp) = runner_with(Arc::new(GatedRunner { gate, succeed: true })).await;
        let mut rx = runner.subscribe();

        let job = runner.create_job("parcels.zip", b"PK").await.unwrap();
        runner.start_conversion(job);

        let change = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout waiting for status change")
            .expect("channel error");
        assert_eq!(change.job_id, 1);
        assert_eq!(change.name, "parcels");
        assert_eq!(change.status, JobStatus::Finished);
    }

    #[tokio::test]
    async fn test_failed_status_write_resolves_to_none() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = Arc::new(Semaphore::new(1));
        let runner = JobRunner::new(
            Arc::new(BrokenStore),
            ArchiveStore::new(tmp.path()),
            Arc::new(GatedRunner { gate, succeed: true }),
        );
        let mut rx = runner.subscribe();

        assert_eq!(runner.start_conversion(started_job(1)).await.unwrap(), None);
        assert!(rx.try_recv().is_err());
        assert_eq!(runner.active_conversions(), 0);
    }

    #[tokio::test]
    async fn test_panicking_conversion_releases_active_count() {
        let (runner, db, _tmp) = runner_with(Arc::new(PanickingRunner)).await;

        let job = runner.create_job("parcels.zip", b"PK").await.unwrap();
        let handle = runner.start_conversion(job.clone());

        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(runner.active_conversions(), 0);
        assert_eq!(
            db.get_shapefile(job.id).await.unwrap().unwrap().status,
            JobStatus::Started
        );
    }
}
