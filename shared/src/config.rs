use std::time::Duration;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    /// Reads `TALESHELF_ENV`; unset or unknown means development.
    pub fn from_env() -> Self {
        std::env::var("TALESHELF_ENV")
            .map(|v| Self::parse(&v))
            .unwrap_or(Environment::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub http_port: u16,
    pub cache_ttl: Duration,
    pub cache_max_entries: Option<u64>,
    pub page_size: u32,
    pub max_cover_bytes: u64,
    pub cover_folder: String,
    pub public_storage_url: String,
    pub moderator_token: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
    pub const DEFAULT_PAGE_SIZE: u32 = 6;
    pub const DEFAULT_MAX_COVER_BYTES: u64 = 5 * 1024 * 1024;
    const DEFAULT_COVER_FOLDER: &'static str = "covers";
    const DEFAULT_PUBLIC_STORAGE_URL: &'static str = "http://localhost:8080/storage/story-covers";
    const DEFAULT_MODERATOR_TOKEN: &'static str = "dev-moderator-token";

    pub fn from_env() -> Self {
        Self {
            environment: Environment::from_env(),
            host: std::env::var("TALESHELF_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_var("TALESHELF_HTTP_PORT", 8080),
            cache_ttl: Duration::from_secs(parse_var(
                "TALESHELF_CACHE_TTL_SECS",
                Self::DEFAULT_CACHE_TTL_SECS,
            )),
            cache_max_entries: std::env::var("TALESHELF_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
            page_size: parse_var("TALESHELF_PAGE_SIZE", Self::DEFAULT_PAGE_SIZE).max(1),
            max_cover_bytes: parse_var("TALESHELF_MAX_COVER_BYTES", Self::DEFAULT_MAX_COVER_BYTES),
            cover_folder: std::env::var("TALESHELF_COVER_FOLDER")
                .unwrap_or_else(|_| Self::DEFAULT_COVER_FOLDER.to_string()),
            public_storage_url: std::env::var("TALESHELF_PUBLIC_STORAGE_URL")
                .unwrap_or_else(|_| Self::DEFAULT_PUBLIC_STORAGE_URL.to_string()),
            moderator_token: std::env::var("TALESHELF_MODERATOR_TOKEN").unwrap_or_else(|_| {
                warn!("TALESHELF_MODERATOR_TOKEN not set, using the development token");
                Self::DEFAULT_MODERATOR_TOKEN.to_string()
            }),
            allowed_origins: std::env::var("TALESHELF_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            cache_ttl: Duration::from_secs(Self::DEFAULT_CACHE_TTL_SECS),
            cache_max_entries: None,
            page_size: Self::DEFAULT_PAGE_SIZE,
            max_cover_bytes: Self::DEFAULT_MAX_COVER_BYTES,
            cover_folder: Self::DEFAULT_COVER_FOLDER.to_string(),
            public_storage_url: Self::DEFAULT_PUBLIC_STORAGE_URL.to_string(),
            moderator_token: Self::DEFAULT_MODERATOR_TOKEN.to_string(),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
