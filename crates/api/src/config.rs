//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::SubmissionRules;
use fulfillment::{DispatchConfig, ReconcileConfig, SmtpSettings, UploadFolders};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address and listen port
/// - `RUST_LOG`: tracing filter, read by the subscriber before this loads
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on in-memory stores
/// - `ADMIN_TOKEN`: operator credential expected in `X-Admin-Token`
/// - `MAX_PARALLEL_UPLOADS`, `UPLOAD_TIMEOUT_SECS`, `UPLOAD_FOLDER`,
///   `UPLOAD_DIR`, `UPLOAD_BASE_URL`: object storage uploads
/// - `MAIL_ENABLED`, `MAIL_FROM`, `MAIL_TIMEOUT_SECS`: decision emails
/// - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASS`, `SMTP_SECURE`: mail transport
/// - `DISPATCH_INTERVAL_SECS`, `DISPATCH_BATCH_SIZE`, `DISPATCH_MAX_ATTEMPTS`,
///   `SENDING_RECLAIM_SECS`: the decision email dispatcher
/// - `UPLOAD_STALE_SECS`, `RECONCILE_INTERVAL_SECS`: the upload reconciler
/// - `SSE_HEARTBEAT_SECS`, `SSE_BUFFER`: realtime streams
/// - `CATALOG_CACHE_TTL_MS`: catalog view cache
/// - `ALLOWED_EMAIL_DOMAIN`: required suffix of team emails
///
/// Periods and timeouts must be positive; a zero value is logged and replaced
/// by the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub admin_token: Option<String>,
    pub max_parallel_uploads: usize,
    pub upload_timeout: Duration,
    pub upload_folder: String,
    pub upload_dir: Option<String>,
    pub upload_base_url: String,
    pub mail_enabled: bool,
    pub mail_from: String,
    pub mail_timeout: Duration,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub smtp_secure: bool,
    pub dispatch_interval: Duration,
    pub dispatch_batch_size: usize,
    pub dispatch_max_attempts: u32,
    pub sending_reclaim: Duration,
    pub upload_stale: Duration,
    pub reconcile_interval: Duration,
    pub sse_heartbeat: Duration,
    pub sse_buffer: usize,
    pub catalog_cache_ttl: Duration,
    pub allowed_email_domain: String,
}

/// Typed access to a key/value source.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, "ignoring unparseable setting");
                default
            }),
            None => default,
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
            None => default,
        }
    }

    /// A strictly positive duration in `unit`s.
    fn period(&self, key: &str, default: Duration, unit: fn(u64) -> Duration) -> Duration {
        match self.get(key) {
            None => default,
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => {
                    tracing::warn!(key, default = ?default, "setting must be positive, using default");
                    default
                }
                Ok(n) => unit(n),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparseable setting");
                    default
                }
            },
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let v = Vars(lookup);
        let d = Self::default();
        let secs = Duration::from_secs;
        Self {
            host: v.get("HOST").unwrap_or(d.host),
            port: v.parsed("PORT", d.port),
            database_url: v.get("DATABASE_URL"),
            admin_token: v.get("ADMIN_TOKEN"),
            max_parallel_uploads: v.parsed("MAX_PARALLEL_UPLOADS", d.max_parallel_uploads),
            upload_timeout: v.period("UPLOAD_TIMEOUT_SECS", d.upload_timeout, secs),
            upload_folder: v.get("UPLOAD_FOLDER").unwrap_or(d.upload_folder),
            upload_dir: v.get("UPLOAD_DIR"),
            upload_base_url: v.get("UPLOAD_BASE_URL").unwrap_or(d.upload_base_url),
            mail_enabled: v.flag("MAIL_ENABLED", d.mail_enabled),
            mail_from: v.get("MAIL_FROM").unwrap_or(d.mail_from),
            mail_timeout: v.period("MAIL_TIMEOUT_SECS", d.mail_timeout, secs),
            smtp_host: v.get("SMTP_HOST"),
            smtp_port: v.parsed("SMTP_PORT", d.smtp_port),
            smtp_user: v.get("SMTP_USER"),
            smtp_pass: v.get("SMTP_PASS"),
            smtp_secure: v.flag("SMTP_SECURE", d.smtp_secure),
            dispatch_interval: v.period("DISPATCH_INTERVAL_SECS", d.dispatch_interval, secs),
            dispatch_batch_size: v.parsed("DISPATCH_BATCH_SIZE", d.dispatch_batch_size),
            dispatch_max_attempts: v.parsed("DISPATCH_MAX_ATTEMPTS", d.dispatch_max_attempts),
            sending_reclaim: v.period("SENDING_RECLAIM_SECS", d.sending_reclaim, secs),
            upload_stale: v.period("UPLOAD_STALE_SECS", d.upload_stale, secs),
            reconcile_interval: v.period("RECONCILE_INTERVAL_SECS", d.reconcile_interval, secs),
            sse_heartbeat: v.period("SSE_HEARTBEAT_SECS", d.sse_heartbeat, secs),
            sse_buffer: v.parsed("SSE_BUFFER", d.sse_buffer),
            catalog_cache_ttl: v.period(
                "CATALOG_CACHE_TTL_MS",
                d.catalog_cache_ttl,
                Duration::from_millis,
            ),
            allowed_email_domain: v
                .get("ALLOWED_EMAIL_DOMAIN")
                .unwrap_or(d.allowed_email_domain),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn submission_rules(&self) -> SubmissionRules {
        SubmissionRules {
            allowed_email_domain: self.allowed_email_domain.clone(),
            ..SubmissionRules::default()
        }
    }

    pub fn upload_folders(&self) -> UploadFolders {
        UploadFolders {
            payments: self.upload_folder.clone(),
            ..UploadFolders::default()
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            interval: self.dispatch_interval,
            batch_size: self.dispatch_batch_size,
            max_attempts: self.dispatch_max_attempts,
            reclaim_after: self.sending_reclaim,
            send_timeout: self.mail_timeout,
        }
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            interval: self.reconcile_interval,
            stale_after: self.upload_stale,
        }
    }

    /// SMTP transport settings, or `None` unless host, user and password are all set.
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        Some(SmtpSettings {
            host: self.smtp_host.clone()?,
            port: self.smtp_port,
            user: self.smtp_user.clone()?,
            pass: self.smtp_pass.clone()?,
            secure: self.smtp_secure,
            from: self.mail_from.clone(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            admin_token: None,
            max_parallel_uploads: 8,
            upload_timeout: Duration::from_secs(60),
            upload_folder: "food-portal/payments".to_string(),
            upload_dir: None,
            upload_base_url: "http://localhost:3000/uploads".to_string(),
            mail_enabled: false,
            mail_from: "CB Food Portal <no-reply@localhost>".to_string(),
            mail_timeout: Duration::from_secs(30),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_pass: None,
            smtp_secure: false,
            dispatch_interval: Duration::from_secs(15),
            dispatch_batch_size: 10,
            dispatch_max_attempts: 10,
            sending_reclaim: Duration::from_secs(600),
            upload_stale: Duration::from_secs(900),
            reconcile_interval: Duration::from_secs(60),
            sse_heartbeat: Duration::from_secs(25),
            sse_buffer: 64,
            catalog_cache_ttl: Duration::from_millis(2000),
            allowed_email_domain: "@klu.ac.in".to_string(),
        }
    }
}
