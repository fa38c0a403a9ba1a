//! Vast search-offers client with rate limiting and retry.
//!
//! Every query is a POST to `/bundles/` carrying a filter object. Transient
//! failures (network errors, 429 and 5xx) are retried with a linear backoff
//! aligned to the marketplace's minimum poll interval, honouring
//! `Retry-After` when the server sends it.
//!
//! # Example
//!
//! ```ignore
//! use vastwatch_vast::{OfferQuery, VastClient, VastClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = VastClientConfig::default().with_api_key(std::env::var("VAST_API_KEY")?);
//!     let client = VastClient::new(config)?;
//!
//!     let offers = client.search(OfferQuery::AVAILABLE).await?;
//!     println!("{} offers available", offers.len());
//!     Ok(())
//! }
//! ```

use crate::error::{Result, VastError};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use vastwatch_core::{CollectorConfig, OfferState, VastConfig, MIN_POLL_INTERVAL_SECS};

use crate::models::is_truthy;

// =============================================================================
// Constants
// =============================================================================

/// Vast public API base URL.
pub const VAST_BASE_URL: &str = "https://cloud.vast.ai/api/v0";

/// Search-offers endpoint, relative to the base URL.
pub const SEARCH_OFFERS_PATH: &str = "/bundles/";

/// Attempts per query before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Maximum offers requested per query.
pub const OFFER_LIMIT: u32 = 10_000;

const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
const SNIPPET_CHARS: usize = 200;
const ERROR_BODY_CHARS: usize = 500;

// =============================================================================
// Queries
// =============================================================================

/// The `rented`/`rentable` pair that selects one slice of the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferQuery {
    pub rented: bool,
    /// `None` leaves the rentable flag unconstrained.
    pub rentable: Option<bool>,
}

impl OfferQuery {
    /// Listed and free.
    pub const AVAILABLE: Self = Self {
        rented: false,
        rentable: Some(true),
    };

    /// Rented, regardless of the rentable flag.
    pub const RENTED: Self = Self {
        rented: true,
        rentable: None,
    };

    /// Not rented and not rentable.
    pub const UNAVAILABLE: Self = Self {
        rented: false,
        rentable: Some(false),
    };

    /// State implied by membership in this query's result.
    #[must_use]
    pub fn source_state(&self) -> OfferState {
        match (self.rented, self.rentable) {
            (true, _) => OfferState::Rented,
            (false, Some(true)) => OfferState::Available,
            (false, Some(false)) => OfferState::Unavailable,
            (false, None) => OfferState::Unknown,
        }
    }
}

/// Anything that can answer a search-offers query with raw offer objects.
#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn search_offers(&self, query: OfferQuery) -> Result<Vec<Value>>;
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Vast client.
#[derive(Clone)]
pub struct VastClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Bearer token.
    pub api_key: Option<String>,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// When false, every query is restricted to verified hosts.
    pub include_unverified: bool,

    /// Extra filter keys merged into every query.
    pub extra_filters: Map<String, Value>,

    /// Attempts per query.
    pub max_attempts: u32,

    /// Backoff unit; delay is `min(4 × base, base × attempt)` plus jitter.
    pub backoff_base: Duration,
}

impl std::fmt::Debug for VastClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VastClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("requests_per_minute", &self.requests_per_minute)
            .field("timeout_secs", &self.timeout_secs)
            .field("include_unverified", &self.include_unverified)
            .field("extra_filters", &self.extra_filters)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base", &self.backoff_base)
            .finish()
    }
}

impl Default for VastClientConfig {
    fn default() -> Self {
        Self {
            base_url: VAST_BASE_URL.to_string(),
            api_key: None,
            requests_per_minute: nonzero!(30u32),
            timeout_secs: 60,
            include_unverified: true,
            extra_filters: Map::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(MIN_POLL_INTERVAL_SECS),
        }
    }
}

impl VastClientConfig {
    /// Builds a client configuration from the `[vast]` and `[collector]` sections.
    #[must_use]
    pub fn from_config(vast: &VastConfig, collector: &CollectorConfig) -> Self {
        Self {
            base_url: vast.base_url.clone(),
            api_key: vast.api_key.clone(),
            requests_per_minute: NonZeroU32::new(vast.requests_per_minute)
                .unwrap_or(nonzero!(30u32)),
            timeout_secs: vast.timeout_secs,
            include_unverified: collector.include_unverified,
            extra_filters: parse_extra_filters(collector.extra_filters_json.as_deref()),
            ..Default::default()
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Includes or excludes unverified hosts.
    #[must_use]
    pub fn with_include_unverified(mut self, include: bool) -> Self {
        self.include_unverified = include;
        self
    }

    /// Sets extra filter keys.
    #[must_use]
    pub fn with_extra_filters(mut self, filters: Map<String, Value>) -> Self {
        self.extra_filters = filters;
        self
    }

    /// Sets attempts per query.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff unit.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }
}

/// Parses the extra-filters JSON object.
///
/// Anything other than a JSON object is logged and ignored.
#[must_use]
pub fn parse_extra_filters(raw: Option<&str>) -> Map<String, Value> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(value = %other, "Extra filters must be a JSON object, ignoring");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse extra filters JSON, ignoring");
            Map::new()
        }
    }
}

// =============================================================================
// Backoff
// =============================================================================

/// Linear backoff capped at four units. Attempt 0 counts as 1.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.max(1))
        .min(base.saturating_mul(4))
}

/// Adds up to 10% random jitter.
#[must_use]
pub fn with_jitter(delay: Duration) -> Duration {
    let fraction: f64 = rand::thread_rng().gen_range(0.0..=0.1);
    delay + delay.mul_f64(fraction)
}

/// Parses a `Retry-After` header given in (possibly fractional) seconds.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

// =============================================================================
// Response parsing
// =============================================================================

/// Pulls the offer array out of a search response.
///
/// Looks at `offers`, `matches`, `data`, `result` in that order, then falls
/// back to the first array-valued field.
///
/// # Errors
/// Returns `MissingOfferList` if the body holds no array.
pub fn extract_offers(body: Value) -> Result<Vec<Value>> {
    let Value::Object(mut map) = body else {
        return Err(VastError::MissingOfferList);
    };

    let preferred = ["offers", "matches", "data", "result"]
        .into_iter()
        .find(|key| map.get(*key).is_some_and(is_truthy));
    if let Some(key) = preferred {
        if let Some(Value::Array(offers)) = map.remove(key) {
            return Ok(offers);
        }
    }

    map.into_iter()
        .find_map(|(_, value)| match value {
            Value::Array(offers) => Some(offers),
            _ => None,
        })
        .ok_or(VastError::MissingOfferList)
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// =============================================================================
// VastClient
// =============================================================================

/// Vast search-offers client.
pub struct VastClient {
    config: VastClientConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for VastClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VastClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl VastClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: VastClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VastError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &VastClientConfig {
        &self.config
    }

    /// Full search-offers URL.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            SEARCH_OFFERS_PATH
        )
    }

    /// Builds the filter object for one query.
    ///
    /// Extra filters overwrite core keys they name; `type` defaults to
    /// on-demand when no extra filter sets it.
    #[must_use]
    pub fn build_query(&self, query: OfferQuery) -> Value {
        let mut q = Map::new();
        q.insert("rented".into(), json!({ "eq": query.rented }));
        q.insert("external".into(), json!({ "eq": false }));
        q.insert("limit".into(), json!(OFFER_LIMIT));
        if let Some(rentable) = query.rentable {
            q.insert("rentable".into(), json!({ "eq": rentable }));
        }
        if !self.config.include_unverified {
            q.insert("verified".into(), json!({ "eq": true }));
        }
        for (key, value) in &self.config.extra_filters {
            q.insert(key.clone(), value.clone());
        }
        q.entry("type").or_insert_with(|| json!("on-demand"));
        Value::Object(q)
    }

    /// Runs one search-offers query and returns the raw offer objects.
    ///
    /// # Errors
    /// - `MissingApiKey` before any request if no key is configured
    /// - `Network`/`Timeout` if the last attempt could not reach the server
    /// - `Unavailable` if every attempt was rate limited or hit a 5xx
    /// - `Api` on any other non-200 status, without retrying
    /// - `UnexpectedContentType`, `InvalidJson`, `MissingOfferList` for bad 200s
    pub async fn search(&self, query: OfferQuery) -> Result<Vec<Value>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(VastError::MissingApiKey)?;

        let url = self.endpoint();
        let payload = self.build_query(query);
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            self.rate_limiter.until_ready().await;

            tracing::debug!(
                %url,
                attempt,
                rented = query.rented,
                rentable = ?query.rentable,
                "POST search offers"
            );

            let sent = self
                .http
                .post(&url)
                .bearer_auth(api_key)
                .header("Accept", "application/json")
                .json(&payload)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    let err = VastError::from(e);
                    if attempt < max_attempts {
                        let delay = with_jitter(backoff_delay(self.config.backoff_base, attempt));
                        tracing::warn!(
                            attempt,
                            delay_secs = delay.as_secs_f64(),
                            error = %err,
                            "Vast request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status().as_u16();
            if status == 200 {
                return Self::read_offers(response).await;
            }

            if RETRYABLE_STATUSES.contains(&status) {
                if attempt < max_attempts {
                    let delay = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after)
                        .unwrap_or_else(|| {
                            with_jitter(backoff_delay(self.config.backoff_base, attempt))
                        });
                    tracing::warn!(
                        status,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "Vast rate-limited or unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(VastError::unavailable(status));
            }

            let body = response.text().await.unwrap_or_default();
            return Err(VastError::api(status, snippet(&body, ERROR_BODY_CHARS)));
        }

        Err(VastError::Network("exhausted retries with Vast API".to_string()))
    }

    async fn read_offers(response: reqwest::Response) -> Result<Vec<Value>> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response.text().await?;

        if !content_type.to_ascii_lowercase().contains("json") {
            return Err(VastError::UnexpectedContentType {
                content_type,
                snippet: snippet(&text, SNIPPET_CHARS),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| VastError::InvalidJson {
            message: e.to_string(),
            snippet: snippet(&text, SNIPPET_CHARS),
        })?;

        extract_offers(body)
    }
}

#[async_trait]
impl OfferSource for VastClient {
    async fn search_offers(&self, query: OfferQuery) -> Result<Vec<Value>> {
        self.search(query).await
    }
}
