// crates/server/src/config.rs
//! Command line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Shapefile upload and conversion server.
#[derive(Parser, Debug, Clone)]
#[command(name = "shapefiley", version, about = "Shapefile upload and conversion server")]
pub struct Config {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "SHAPEFILEY_PORT")]
    pub port: u16,

    /// Address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED), env = "SHAPEFILEY_BIND")]
    pub bind: IpAddr,

    /// Directory uploaded archives are written to and converted in.
    #[arg(long, default_value = "/tmp/shapefiley", env = "SHAPEFILEY_WORK_DIR")]
    pub work_dir: PathBuf,

    /// Directory of static assets served for unmatched paths.
    #[arg(long, default_value = "./static", env = "SHAPEFILEY_STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Job database, a SQLite path or `sqlite:` URL.
    /// Defaults to ~/.cache/shapefiley/shapefiley.db
    #[arg(long, env = "SHAPEFILEY_DATABASE_URL")]
    pub database_url: Option<String>,

    /// PostGIS database the worker script loads converted tables into.
    #[arg(
        long,
        default_value = "postgres://localhost/shapefiley_work",
        env = "SHAPEFILEY_WORK_DATABASE_URL"
    )]
    pub work_database_url: String,

    /// Shell command that runs SQL from stdin against the work database.
    /// Defaults to `psql <work database url>`.
    #[arg(long, env = "SHAPEFILEY_WORK_COMMAND")]
    pub work_command: Option<String>,

    /// Where the generated worker script is written.
    #[arg(long, default_value = "./worker.sh", env = "SHAPEFILEY_WORKER_SCRIPT")]
    pub worker_script: PathBuf,

    /// Largest accepted upload body, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "SHAPEFILEY_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn work_command(&self) -> String {
        self.work_command
            .clone()
            .unwrap_or_else(|| format!("psql '{}'", self.work_database_url.replace('\'', r"'\''")))
    }

    /// The static directory, if it exists.
    pub fn static_dir(&self) -> Option<PathBuf> {
        self.static_dir.is_dir().then(|| self.static_dir.clone())
    }
}
