// src/state.rs

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::errors::ConfigError;
use crate::items_api::ItemsApi;
use crate::listing::ListingForm;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:9000";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DRAFT_IDLE_MINUTES: u64 = 30;
const DEFAULT_MAX_UPLOAD_MB: usize = 20;
const MAX_DRAFT_IDLE_MINUTES: u64 = 30 * 24 * 60;
const MAX_UPLOAD_MB_LIMIT: usize = 1024;

/// Adres backendu przyjmującego ogłoszenia.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    base_url: String,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)
            .map_err(|e| ConfigError::InvalidBaseUrl(trimmed.to_string(), e.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidBaseUrl(
                trimmed.to_string(),
                format!("nieobsługiwany schemat '{}'", parsed.scheme()),
            ));
        }
        Ok(Self {
            base_url: trimmed.to_string(),
        })
    }

    /// Puste lub brakujące `API_URL` oznacza lokalny backend.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup("API_URL") {
            Some(url) if !url.trim().is_empty() => Self::new(&url),
            _ => {
                tracing::debug!("Brak API_URL, używam domyślnego {}", DEFAULT_API_URL);
                Self::new(DEFAULT_API_URL)
            }
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn items_url(&self) -> String {
        format!("{}/items", self.base_url)
    }

    pub fn image_url(&self, image_name: &str) -> String {
        format!("{}/image/{}", self.base_url, urlencoding::encode(image_name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub draft_idle: Duration,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_raw = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidListenAddr(listen_raw.clone()))?;

        let draft_idle_minutes = match lookup("DRAFT_IDLE_MINUTES") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|minutes| (1..=MAX_DRAFT_IDLE_MINUTES).contains(minutes))
                .ok_or(ConfigError::InvalidNumber("DRAFT_IDLE_MINUTES", raw))?,
            None => DEFAULT_DRAFT_IDLE_MINUTES,
        };
        let max_upload_mb = match lookup("MAX_UPLOAD_MB") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|mb| (1..=MAX_UPLOAD_MB_LIMIT).contains(mb))
                .ok_or(ConfigError::InvalidNumber("MAX_UPLOAD_MB", raw))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };
        let draft_idle_secs = draft_idle_minutes
            .checked_mul(60)
            .ok_or_else(|| ConfigError::InvalidNumber("DRAFT_IDLE_MINUTES", draft_idle_minutes.to_string()))?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::InvalidNumber("MAX_UPLOAD_MB", max_upload_mb.to_string()))?;

        Ok(Self {
            listen_addr,
            draft_idle: Duration::from_secs(draft_idle_secs),
            max_upload_bytes,
        })
    }
}

/// Jeden zamontowany formularz: stan szkicu plus token zamykający
/// wszystkie zadania (dekodowanie podglądu, wysyłka) po wygaśnięciu sesji.
pub struct DraftSession {
    pub form: Mutex<ListingForm>,
    pub shutdown: CancellationToken,
}

impl DraftSession {
    pub fn new(form: ListingForm) -> Self {
        Self {
            form: Mutex::new(form),
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub api_config: ApiConfig,
    pub items_api: ItemsApi,
    pub drafts: Cache<Uuid, Arc<DraftSession>>,
    pub completed_listings: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(api_config: ApiConfig, draft_idle: Duration) -> Self {
        let drafts = Cache::builder()
            .time_to_idle(draft_idle)
            .eviction_listener(|draft_id: Arc<Uuid>, session: Arc<DraftSession>, cause| {
                tracing::debug!("Zamykam szkic {} (powód: {:?})", draft_id, cause);
                session.shutdown.cancel();
            })
            .build();

        Self {
            items_api: ItemsApi::new(reqwest::Client::new(), api_config.clone()),
            api_config,
            drafts,
            completed_listings: Arc::new(AtomicU64::new(0)),
        }
    }
}
