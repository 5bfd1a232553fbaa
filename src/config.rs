use std::{
    env, fmt,
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

use crate::pipeline::complete::MetadataFailurePolicy;
use crate::pipeline::embedding::EmbeddingModel;
use crate::util::redact::redact;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    llm_base_url: String,
    llm_api_key: String,
    llm_model: String,
    llm_timeout: Duration,
    llm_candidate_count: NonZeroUsize,
    catalog_api_base_url: String,
    catalog_auth_url: String,
    catalog_client_id: String,
    catalog_client_secret: String,
    catalog_market: String,
    catalog_max_concurrency: NonZeroUsize,
    catalog_timeout: Duration,
    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
    rank_top_n: NonZeroUsize,
    embedding_model: EmbeddingModel,
    metadata_failure_policy: MetadataFailurePolicy,
    debug_snapshot_dir: Option<PathBuf>,
    playlist_default_name: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("http_bind", &self.http_bind)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("llm_model", &self.llm_model)
            .field("llm_timeout", &self.llm_timeout)
            .field("llm_candidate_count", &self.llm_candidate_count)
            .field("catalog_api_base_url", &self.catalog_api_base_url)
            .field("catalog_auth_url", &self.catalog_auth_url)
            .field("catalog_client_id", &redact(&self.catalog_client_id))
            .field("catalog_client_secret", &redact(&self.catalog_client_secret))
            .field("catalog_market", &self.catalog_market)
            .field("catalog_max_concurrency", &self.catalog_max_concurrency)
            .field("catalog_timeout", &self.catalog_timeout)
            .field("http_max_retries", &self.http_max_retries)
            .field("http_backoff_base_ms", &self.http_backoff_base_ms)
            .field("http_backoff_cap_ms", &self.http_backoff_cap_ms)
            .field("rank_top_n", &self.rank_top_n)
            .field("embedding_model", &self.embedding_model)
            .field("metadata_failure_policy", &self.metadata_failure_policy)
            .field("debug_snapshot_dir", &self.debug_snapshot_dir)
            .field("playlist_default_name", &self.playlist_default_name)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Upper bound for `top_n`, shared by `RANK_TOP_N` and per-request overrides.
pub const MAX_TOP_N: usize = 100;

fn default_catalog_concurrency() -> usize {
    ((num_cpus::get() * 3) / 2).max(2)
}

impl Config {
    /// 環境変数から設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `LLM_API_KEY`・`CATALOG_CLIENT_ID`・`CATALOG_CLIENT_SECRET` が未設定、
    /// もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("PLAYLIST_WORKER_HTTP_BIND", "0.0.0.0:9010")?;

        // Generative service
        let llm_base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1/".to_string());
        let llm_api_key = env_var("LLM_API_KEY")?;
        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "openai/gpt-oss-120b".to_string());
        let llm_timeout = parse_duration_secs("LLM_TIMEOUT_SECS", 120)?;
        let llm_candidate_count = parse_non_zero_usize("LLM_CANDIDATE_COUNT", 50)?;

        // Catalog
        let catalog_api_base_url = env::var("CATALOG_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.spotify.com/v1/".to_string());
        let catalog_auth_url = env::var("CATALOG_AUTH_URL")
            .unwrap_or_else(|_| "https://accounts.spotify.com/api/token".to_string());
        let catalog_client_id = env_var("CATALOG_CLIENT_ID")?;
        let catalog_client_secret = env_var("CATALOG_CLIENT_SECRET")?;
        let catalog_market = parse_market("CATALOG_MARKET", "GB")?;
        let catalog_max_concurrency =
            parse_non_zero_usize("CATALOG_MAX_CONCURRENCY", default_catalog_concurrency())?;
        let catalog_timeout = parse_duration_ms("CATALOG_TIMEOUT_MS", 10000)?;

        // Retry settings (exponential backoff + jitter)
        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10000)?;

        // Ranking
        let rank_top_n = parse_non_zero_usize("RANK_TOP_N", 20)?;
        if rank_top_n.get() > MAX_TOP_N {
            return Err(ConfigError::Invalid {
                name: "RANK_TOP_N",
                source: anyhow::anyhow!("must be at most {MAX_TOP_N}"),
            });
        }
        let embedding_model = parse_from_str("EMBEDDING_MODEL", EmbeddingModel::default())?;
        let metadata_failure_policy =
            parse_from_str("METADATA_FAILURE_POLICY", MetadataFailurePolicy::default())?;

        let debug_snapshot_dir = env::var("DEBUG_SNAPSHOT_DIR")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);
        let playlist_default_name =
            env::var("PLAYLIST_DEFAULT_NAME").unwrap_or_else(|_| "AI Playlist".to_string());

        Ok(Self {
            http_bind,
            llm_base_url,
            llm_api_key,
            llm_model,
            llm_timeout,
            llm_candidate_count,
            catalog_api_base_url,
            catalog_auth_url,
            catalog_client_id,
            catalog_client_secret,
            catalog_market,
            catalog_max_concurrency,
            catalog_timeout,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            rank_top_n,
            embedding_model,
            metadata_failure_policy,
            debug_snapshot_dir,
            playlist_default_name,
        })
    }

    /// 環境変数に依存しないテスト用設定。
    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self {
            http_bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            llm_base_url: "http://localhost/".into(),
            llm_api_key: "test-key".into(),
            llm_model: "test-model".into(),
            llm_timeout: Duration::from_secs(5),
            llm_candidate_count: NonZeroUsize::MIN.saturating_add(49),
            catalog_api_base_url: "http://localhost/v1/".into(),
            catalog_auth_url: "http://localhost/api/token".into(),
            catalog_client_id: "client".into(),
            catalog_client_secret: "secret".into(),
            catalog_market: "GB".into(),
            catalog_max_concurrency: NonZeroUsize::MIN.saturating_add(3),
            catalog_timeout: Duration::from_secs(5),
            http_max_retries: 0,
            http_backoff_base_ms: 1,
            http_backoff_cap_ms: 1,
            rank_top_n: NonZeroUsize::MIN.saturating_add(19),
            embedding_model: EmbeddingModel::default(),
            metadata_failure_policy: MetadataFailurePolicy::Abort,
            debug_snapshot_dir: None,
            playlist_default_name: "AI Playlist".into(),
        }
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn llm_base_url(&self) -> &str {
        &self.llm_base_url
    }

    #[must_use]
    pub fn llm_api_key(&self) -> &str {
        &self.llm_api_key
    }

    #[must_use]
    pub fn llm_model(&self) -> &str {
        &self.llm_model
    }

    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        self.llm_timeout
    }

    #[must_use]
    pub fn llm_candidate_count(&self) -> usize {
        self.llm_candidate_count.get()
    }

    #[must_use]
    pub fn catalog_api_base_url(&self) -> &str {
        &self.catalog_api_base_url
    }

    #[must_use]
    pub fn catalog_auth_url(&self) -> &str {
        &self.catalog_auth_url
    }

    #[must_use]
    pub fn catalog_client_id(&self) -> &str {
        &self.catalog_client_id
    }

    #[must_use]
    pub fn catalog_client_secret(&self) -> &str {
        &self.catalog_client_secret
    }

    /// Two upper-case ASCII letters.
    #[must_use]
    pub fn catalog_market(&self) -> &str {
        &self.catalog_market
    }

    #[must_use]
    pub fn catalog_max_concurrency(&self) -> usize {
        self.catalog_max_concurrency.get()
    }

    #[must_use]
    pub fn catalog_timeout(&self) -> Duration {
        self.catalog_timeout
    }

    #[must_use]
    pub fn http_max_retries(&self) -> usize {
        self.http_max_retries
    }

    #[must_use]
    pub fn http_backoff_base_ms(&self) -> u64 {
        self.http_backoff_base_ms
    }

    #[must_use]
    pub fn http_backoff_cap_ms(&self) -> u64 {
        self.http_backoff_cap_ms
    }

    #[must_use]
    pub fn rank_top_n(&self) -> usize {
        self.rank_top_n.get()
    }

    #[must_use]
    pub fn embedding_model(&self) -> EmbeddingModel {
        self.embedding_model
    }

    #[must_use]
    pub fn metadata_failure_policy(&self) -> MetadataFailurePolicy {
        self.metadata_failure_policy
    }

    #[must_use]
    pub fn debug_snapshot_dir(&self) -> Option<&Path> {
        self.debug_snapshot_dir.as_deref()
    }

    #[must_use]
    pub fn playlist_default_name(&self) -> &str {
        &self.playlist_default_name
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let parsed = parse_usize(name, default)?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(value))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_market(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let market = raw.trim().to_ascii_uppercase();
    if market.len() == 2 && market.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(market)
    } else {
        Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("expected a two-letter country code, got `{raw}`"),
        })
    }
}

fn parse_from_str<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|message: String| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!(message),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: &[&str] = &[
        "PLAYLIST_WORKER_HTTP_BIND",
        "LLM_BASE_URL",
        "LLM_API_KEY",
        "LLM_MODEL",
        "LLM_TIMEOUT_SECS",
        "LLM_CANDIDATE_COUNT",
        "CATALOG_API_BASE_URL",
        "CATALOG_AUTH_URL",
        "CATALOG_CLIENT_ID",
        "CATALOG_CLIENT_SECRET",
        "CATALOG_MARKET",
        "CATALOG_MAX_CONCURRENCY",
        "CATALOG_TIMEOUT_MS",
        "HTTP_MAX_RETRIES",
        "HTTP_BACKOFF_BASE_MS",
        "HTTP_BACKOFF_CAP_MS",
        "RANK_TOP_N",
        "EMBEDDING_MODEL",
        "METADATA_FAILURE_POLICY",
        "DEBUG_SNAPSHOT_DIR",
        "PLAYLIST_DEFAULT_NAME",
    ];

    fn set_env(name: &str, value: &str) {
        // SAFETY: tests run sequentially and assign valid UTF-8 values.
        unsafe {
            env::set_var(name, value);
        }
    }

    fn remove_env(name: &str) {
        // SAFETY: tests run sequentially and clean up deterministic keys.
        unsafe {
            env::remove_var(name);
        }
    }

    fn reset_env() {
        for name in ALL_VARS {
            remove_env(name);
        }
    }

    fn set_required() {
        set_env("LLM_API_KEY", "gsk_test");
        set_env("CATALOG_CLIENT_ID", "client-id");
        set_env("CATALOG_CLIENT_SECRET", "client-secret");
    }

    #[test]
    fn from_env_uses_defaults_when_optional_missing() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_required();

        let config = Config::from_env().expect("config should load");

        assert_eq!(config.http_bind(), "0.0.0.0:9010".parse().unwrap());
        assert_eq!(config.llm_base_url(), "https://api.groq.com/openai/v1/");
        assert_eq!(config.llm_model(), "openai/gpt-oss-120b");
        assert_eq!(config.llm_timeout(), Duration::from_secs(120));
        assert_eq!(config.llm_candidate_count(), 50);
        assert_eq!(config.catalog_api_base_url(), "https://api.spotify.com/v1/");
        assert_eq!(
            config.catalog_auth_url(),
            "https://accounts.spotify.com/api/token"
        );
        assert_eq!(config.catalog_market(), "GB");
        assert!(config.catalog_max_concurrency() >= 2);
        assert_eq!(config.catalog_timeout(), Duration::from_millis(10000));
        assert_eq!(config.http_max_retries(), 3);
        assert_eq!(config.http_backoff_base_ms(), 250);
        assert_eq!(config.http_backoff_cap_ms(), 10000);
        assert_eq!(config.rank_top_n(), 20);
        assert_eq!(config.embedding_model(), EmbeddingModel::AllMiniLmL12V2);
        assert_eq!(
            config.metadata_failure_policy(),
            MetadataFailurePolicy::Abort
        );
        assert!(config.debug_snapshot_dir().is_none());
        assert_eq!(config.playlist_default_name(), "AI Playlist");
    }

    #[test]
    fn from_env_overrides_values() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_required();
        set_env("PLAYLIST_WORKER_HTTP_BIND", "127.0.0.1:8088");
        set_env("LLM_MODEL", "llama-3.3-70b-versatile");
        set_env("LLM_CANDIDATE_COUNT", "30");
        set_env("CATALOG_MARKET", "us");
        set_env("CATALOG_MAX_CONCURRENCY", "8");
        set_env("HTTP_MAX_RETRIES", "5");
        set_env("RANK_TOP_N", "10");
        set_env("EMBEDDING_MODEL", "all-minilm-l6-v2");
        set_env("METADATA_FAILURE_POLICY", "skip");
        set_env("DEBUG_SNAPSHOT_DIR", "/tmp/playlist-debug");
        set_env("PLAYLIST_DEFAULT_NAME", "Mood Mix");

        let config = Config::from_env().expect("config should load");

        assert_eq!(config.http_bind(), "127.0.0.1:8088".parse().unwrap());
        assert_eq!(config.llm_model(), "llama-3.3-70b-versatile");
        assert_eq!(config.llm_candidate_count(), 30);
        assert_eq!(config.catalog_market(), "US");
        assert_eq!(config.catalog_max_concurrency(), 8);
        assert_eq!(config.http_max_retries(), 5);
        assert_eq!(config.rank_top_n(), 10);
        assert_eq!(config.embedding_model(), EmbeddingModel::AllMiniLmL6V2);
        assert_eq!(config.metadata_failure_policy(), MetadataFailurePolicy::Skip);
        assert_eq!(
            config.debug_snapshot_dir(),
            Some(Path::new("/tmp/playlist-debug"))
        );
        assert_eq!(config.playlist_default_name(), "Mood Mix");
    }

    #[test]
    fn from_env_errors_when_api_key_missing() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("CATALOG_CLIENT_ID", "client-id");
        set_env("CATALOG_CLIENT_SECRET", "client-secret");

        let error = Config::from_env().expect_err("missing key should fail");

        assert!(matches!(error, ConfigError::Missing("LLM_API_KEY")));
    }

    #[test]
    fn from_env_errors_when_catalog_secret_missing() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("LLM_API_KEY", "gsk_test");
        set_env("CATALOG_CLIENT_ID", "client-id");

        let error = Config::from_env().expect_err("missing secret should fail");

        assert!(matches!(
            error,
            ConfigError::Missing("CATALOG_CLIENT_SECRET")
        ));
    }

    #[test]
    fn from_env_rejects_zero_top_n() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_required();
        set_env("RANK_TOP_N", "0");

        let error = Config::from_env().expect_err("zero should fail");

        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "RANK_TOP_N",
                ..
            }
        ));
    }

    #[test]
    fn from_env_rejects_top_n_above_request_bound() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_required();
        set_env("RANK_TOP_N", "150");

        let error = Config::from_env().expect_err("150 exceeds the bound");

        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "RANK_TOP_N",
                ..
            }
        ));

        set_env("RANK_TOP_N", &MAX_TOP_N.to_string());
        let config = Config::from_env().expect("the bound itself is accepted");
        assert_eq!(config.rank_top_n(), MAX_TOP_N);
        reset_env();
    }

    #[test]
    fn from_env_rejects_bad_market_and_policy() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_required();
        set_env("CATALOG_MARKET", "GBR");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "CATALOG_MARKET",
                ..
            })
        ));

        set_env("CATALOG_MARKET", "GB");
        set_env("METADATA_FAILURE_POLICY", "retry");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "METADATA_FAILURE_POLICY",
                ..
            })
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_required();

        let config = Config::from_env().expect("config should load");
        let rendered = format!("{config:?}");

        assert!(!rendered.contains("client-secret"));
        assert!(!rendered.contains("gsk_test"));
    }
}
