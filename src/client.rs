use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use tracing::{debug, warn};

use crate::cache::DocumentCache;
use crate::schedule;
use crate::types::{
    Activity, ConfigDocument, StatusDocument, WriteResult, ZoneConfig, ZoneStatus,
};
use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(5);
const DEFAULT_CONFIG_TTL: Duration = Duration::from_secs(30);

pub struct InfinitudeClientBuilder {
    url: String,
    timeout: Duration,
    status_ttl: Duration,
    config_ttl: Duration,
}

impl InfinitudeClientBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            status_ttl: DEFAULT_STATUS_TTL,
            config_ttl: DEFAULT_CONFIG_TTL,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    pub fn config_ttl(mut self, ttl: Duration) -> Self {
        self.config_ttl = ttl;
        self
    }

    pub fn build(self) -> InfinitudeClient {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .expect("failed to build HTTP client");

        InfinitudeClient {
            http,
            base_url: self.url.trim_end_matches('/').to_string(),
            status_ttl: self.status_ttl,
            config_ttl: self.config_ttl,
            cache: Arc::new(DocumentCache::new()),
        }
    }
}

/// Both remote documents, each independently cached; a missing piece means
/// that document is currently unknown, not that the whole call failed.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub status: Option<StatusDocument>,
    pub config: Option<ConfigDocument>,
}

/// Client for one Infinitude endpoint. Cloning shares the cache and the
/// HTTP connection pool.
#[derive(Clone)]
pub struct InfinitudeClient {
    http: reqwest::Client,
    base_url: String,
    status_ttl: Duration,
    config_ttl: Duration,
    cache: Arc<DocumentCache>,
}

impl InfinitudeClient {
    pub fn builder(url: impl Into<String>) -> InfinitudeClientBuilder {
        InfinitudeClientBuilder::new(url)
    }

    pub(crate) fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn fetch_status(&self) -> Result<StatusDocument> {
        let url = format!("{}/status.xml", self.base_url);
        debug!(url = %url, "fetching status document");
        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        quick_xml::de::from_str(&body).map_err(|e| Error::Decode(format!("status.xml: {e}")))
    }

    async fn fetch_config(&self) -> Result<ConfigDocument> {
        let url = format!("{}/systems.json", self.base_url);
        debug!(url = %url, "fetching config document");
        let doc: ConfigDocument = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Decode(format!("systems.json: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Latest status telemetry, served from cache within the status TTL.
    /// `None` means temporarily unknown, not an error.
    pub async fn get_status(&self) -> Option<StatusDocument> {
        self.cache
            .status
            .get_or_fetch(self.status_ttl, || self.fetch_status())
            .await
    }

    /// Latest config document, served from cache within the config TTL.
    pub async fn get_config(&self) -> Option<ConfigDocument> {
        self.config_snapshot(self.config_ttl).await
    }

    pub(crate) async fn config_snapshot(&self, ttl: Duration) -> Option<ConfigDocument> {
        self.cache
            .config
            .get_or_fetch(ttl, || self.fetch_config())
            .await
    }

    /// Force a status fetch regardless of cache age.
    pub async fn refresh_status(&self) -> Option<StatusDocument> {
        self.cache
            .status
            .get_or_fetch(Duration::ZERO, || self.fetch_status())
            .await
    }

    /// Force a config fetch regardless of cache age.
    pub async fn refresh_config(&self) -> Option<ConfigDocument> {
        self.cache
            .config
            .get_or_fetch(Duration::ZERO, || self.fetch_config())
            .await
    }

    pub async fn zone_status(&self, zone_id: &str) -> Option<ZoneStatus> {
        self.get_status().await?.zone(zone_id).cloned()
    }

    pub async fn zone_config(&self, zone_id: &str) -> Option<ZoneConfig> {
        self.get_config().await?.zone(zone_id).cloned()
    }

    /// Zones the device reports as enabled; the set accessories get built
    /// from.
    pub async fn enabled_zones(&self) -> Vec<ZoneStatus> {
        self.get_status()
            .await
            .map(|s| s.enabled_zones().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get_system(&self) -> SystemSnapshot {
        SystemSnapshot {
            status: self.get_status().await,
            config: self.get_config().await,
        }
    }

    /// POST the full config document to the device. Network trouble is a
    /// `WriteResult` with no status, not an `Err`, so callers can tell
    /// "device rejected" from "device unreachable".
    pub async fn post_config(&self, doc: &ConfigDocument) -> WriteResult {
        let url = format!("{}/systems/infinitude", self.base_url);
        debug!(url = %url, "posting config document");
        match self.http.post(&url).json(doc).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if !(200..300).contains(&status) {
                    warn!(status, "device rejected config write");
                }
                WriteResult {
                    status: Some(status),
                }
            }
            Err(e) => {
                warn!(error = %e, "config write failed");
                WriteResult { status: None }
            }
        }
    }

    /// The activity the weekly program schedules for this zone right now,
    /// falling back to the device-reported current activity when no period
    /// has started yet today. `Ok(None)` means the documents are
    /// temporarily unknown.
    pub async fn scheduled_activity(&self, zone_id: &str) -> Result<Option<Activity>> {
        let Some(config) = self.get_config().await else {
            return Ok(None);
        };
        let Some(status) = self.get_status().await else {
            return Ok(None);
        };
        let zone = config
            .zone(zone_id)
            .ok_or_else(|| Error::ZoneNotFound(zone_id.to_string()))?;
        let local = status.device_time()?;

        let id = match schedule::current_activity(zone, local)? {
            Some(id) => id,
            None => match status.zone(zone_id).and_then(|z| z.current_activity) {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        let activity = zone.activity(id).ok_or_else(|| Error::ActivityNotFound {
            zone: zone_id.to_string(),
            activity: id,
        })?;
        Ok(Some(activity.clone()))
    }

    /// When the next scheduled period starts, in device local time.
    /// `Ok(None)` covers both "no enabled period anywhere in the week" and
    /// "documents temporarily unknown"; either way a hold taken now has
    /// nothing to expire against and must be open-ended.
    pub async fn next_scheduled_transition(&self, zone_id: &str) -> Result<Option<NaiveTime>> {
        let Some(config) = self.get_config().await else {
            return Ok(None);
        };
        let Some(status) = self.get_status().await else {
            return Ok(None);
        };
        let zone = config
            .zone(zone_id)
            .ok_or_else(|| Error::ZoneNotFound(zone_id.to_string()))?;
        let local = status.device_time()?;
        schedule::next_transition(zone, local)
    }
}
