// crates/server/src/main.rs
//! Shapefiley server binary.
//!
//! Startup order: regenerate `worker.sh` (fails fast without shp2pgsql),
//! open the job database, set up the lazily connected work database, then
//! serve.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shapefiley_core::worker_script::{locate_tool, WorkerScript, SHP2PGSQL};
use shapefiley_core::{ArchiveStore, ScriptRunner};
use shapefiley_db::{Database, GeometryReader, WorkDatabase};
use shapefiley_server::{create_app, AppState, Config, JobRunner};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "warn,shapefiley=info,shapefiley_server=info,shapefiley_core=info,shapefiley_db=info,tower_http=info"
                .into()
        }))
        .init();

    let config = Config::parse();

    // Step 1: Work directory and worker script
    let archives = ArchiveStore::new(&config.work_dir);
    archives
        .ensure_root()
        .await
        .with_context(|| format!("creating work directory {}", archives.root().display()))?;

    let shp2pgsql = locate_tool(SHP2PGSQL)?;
    let script = WorkerScript {
        work_dir: archives.root().to_path_buf(),
        shp2pgsql,
        work_command: config.work_command(),
    };
    script.write(&config.worker_script)?;
    let script_path = std::path::absolute(&config.worker_script)
        .with_context(|| format!("resolving {}", config.worker_script.display()))?;

    // Step 2: Job database
    let db = match config.database_url.as_deref() {
        Some(location) => Database::open(location).await?,
        None => Database::open_default().await?,
    };

    // Step 3: Work database, dialled on first geometry read
    let work_db = WorkDatabase::connect_lazy(&config.work_database_url)
        .context("invalid work database URL")?;
    tracing::info!(
        job_db = %db.db_path().display(),
        work_dir = %archives.root().display(),
        worker_script = %script_path.display(),
        "Databases configured"
    );

    // Step 4: Wire up jobs and state
    let jobs = Arc::new(JobRunner::new(
        Arc::new(db),
        archives,
        Arc::new(ScriptRunner::new(script_path)),
    ));
    let state = AppState::new(jobs, GeometryReader::new(Arc::new(work_db)));
    let app = create_app(state, config.static_dir(), config.max_upload_bytes);

    // Step 5: Serve
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Shapefiley v{} listening on http://{addr}", env!("CARGO_PKG_VERSION"));
    axum::serve(listener, app).await?;

    Ok(())
}
