use anyhow::{Context, Result};
use clap::Parser;
use std::{
    env,
    path::{Path, PathBuf},
};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Root directory for uploaded image content.
    pub upload_dir: String,
    /// Resolve a relative `upload_dir` against the executable's directory
    /// instead of the working directory.
    pub upload_relative_to_home: bool,
    /// Base URL used when building `href` links in responses.
    pub base_url: String,
    /// `chrono` format string for the timestamp part of generated filenames.
    pub timestamp_format: String,
    /// Time zone for filename timestamps: `utc` or `local`.
    pub timestamp_timezone: String,
    /// Generated filename template; placeholders `{timestamp}`, `{random}`,
    /// `{extension}`.
    pub filename_template: String,
    /// Exclusive upper bound for the random filename suffix.
    pub random_bound: u32,
    /// Name assumed for uploads that arrive without an original filename.
    pub fallback_filename: String,
    /// Maximum accepted request body size for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// HS256 key shared with the identity provider.
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Image gallery REST service")]
pub struct Args {
    /// Host to bind to (overrides GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides GALLERY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory where uploaded content is stored (overrides GALLERY_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// Resolve a relative upload dir against the executable's directory
    #[arg(long)]
    pub upload_relative_to_home: bool,

    /// Base URL for entity links (overrides GALLERY_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Timestamp format for generated filenames
    #[arg(long, default_value = "%Y%m%d%H%M%S%3f")]
    pub timestamp_format: String,

    /// Time zone for filename timestamps (utc or local)
    #[arg(long, default_value = "utc")]
    pub timestamp_timezone: String,

    /// Generated filename template
    #[arg(long, default_value = "{timestamp}-{random}{extension}")]
    pub filename_template: String,

    /// Exclusive upper bound for the random filename suffix
    #[arg(long, default_value_t = 1_000_000)]
    pub random_bound: u32,

    /// Filename assumed when an upload has no original name
    #[arg(long, default_value = "upload")]
    pub fallback_filename: String,

    /// Maximum accepted upload body size in bytes
    #[arg(long, default_value_t = 50 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("GALLERY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("GALLERY_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing GALLERY_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading GALLERY_PORT"),
        };
        let env_db = env::var("GALLERY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/gallery.db".into());
        let env_upload =
            env::var("GALLERY_UPLOAD_DIR").unwrap_or_else(|_| "./data/uploads".into());
        let env_base_url =
            env::var("GALLERY_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let jwt_secret = env::var("GALLERY_JWT_SECRET").unwrap_or_else(|_| "insecure-dev-secret".into());
        let jwt_issuer = env::var("GALLERY_JWT_ISSUER").ok();
        let jwt_audience = env::var("GALLERY_JWT_AUDIENCE").ok();

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            upload_dir: args.upload_dir.unwrap_or(env_upload),
            upload_relative_to_home: args.upload_relative_to_home,
            base_url: args.base_url.unwrap_or(env_base_url),
            timestamp_format: args.timestamp_format,
            timestamp_timezone: args.timestamp_timezone,
            filename_template: args.filename_template,
            random_bound: args.random_bound.max(1),
            fallback_filename: args.fallback_filename,
            max_upload_bytes: args.max_upload_bytes,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute (or cwd-relative) root for uploaded content.
    pub fn upload_root(&self) -> PathBuf {
        let configured = Path::new(&self.upload_dir);
        if self.upload_relative_to_home && configured.is_relative() {
            if let Some(home) = env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
            {
                return home.join(configured);
            }
        }
        configured.to_path_buf()
    }
}
