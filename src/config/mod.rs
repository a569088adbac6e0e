use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

/// Runtime configuration for the panel
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Directory all file operations are confined to (default: "./data")
    pub root_dir: PathBuf,

    /// Maximum upload size in bytes (default: 10 MB)
    pub max_upload_size: usize,

    /// Session lifetime in seconds (default: 24 hours)
    pub session_ttl_secs: u64,

    /// Interval between expired-session sweeps in seconds (default: 300)
    pub session_sweep_secs: u64,

    /// File extensions refused on upload, lowercase without the dot
    pub blocked_extensions: Vec<String>,

    /// Database URL (default: local SQLite file)
    pub database_url: String,

    /// Identifier of the admin account seeded on first start
    pub admin_identifier: String,

    /// Password for the seeded admin. Seeding is skipped when unset.
    pub admin_password: Option<String>,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Reverse proxies whose X-Forwarded-For / X-Real-IP headers are believed
    pub trusted_proxies: Vec<IpAddr>,

    /// Mark the session cookie `Secure` (default: true)
    pub secure_cookies: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data"),
            max_upload_size: 10 * 1024 * 1024, // 10 MB
            session_ttl_secs: 24 * 60 * 60,
            session_sweep_secs: 300,
            blocked_extensions: Vec::new(),
            database_url: "sqlite://panel.db?mode=rwc".to_string(),
            admin_identifier: "admin".to_string(),
            admin_password: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
            trusted_proxies: Vec::new(),
            secure_cookies: true,
        }
    }
}

fn parse_ip_list(value: &str) -> Vec<IpAddr> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!("Ignoring invalid trusted proxy address '{}'", s);
                None
            }
        })
        .collect()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl PanelConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            root_dir: env::var("PANEL_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.root_dir),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.session_ttl_secs),

            session_sweep_secs: env::var("SESSION_SWEEP_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.session_sweep_secs),

            blocked_extensions: env::var("BLOCKED_EXTENSIONS")
                .map(|v| parse_list(&v))
                .unwrap_or(default.blocked_extensions),

            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            admin_identifier: env::var("ADMIN_IDENTIFIER").unwrap_or(default.admin_identifier),

            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),

            trusted_proxies: env::var("TRUSTED_PROXIES")
                .map(|v| parse_ip_list(&v))
                .unwrap_or(default.trusted_proxies),

            secure_cookies: env::var("SECURE_COOKIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.secure_cookies),
        }
    }

    /// Create config for development (short sweeps, plain-HTTP cookies)
    pub fn development() -> Self {
        Self {
            session_sweep_secs: 60,
            secure_cookies: false,
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    /// Create config for production (executables and scripts refused)
    pub fn production() -> Self {
        let from_env = Self::from_env();
        let blocked_extensions = if from_env.blocked_extensions.is_empty() {
            parse_list("exe,dll,bat,cmd,ps1,msi,com,scr")
        } else {
            from_env.blocked_extensions.clone()
        };
        Self {
            blocked_extensions,
            ..from_env
        }
    }

    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_ttl_secs)
    }
}
