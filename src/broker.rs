//! IG broker connectivity
//!
//! The engine only sees the [`Broker`] trait: a synchronous fetch/submit
//! contract that tests satisfy with deterministic fakes. [`IgClient`] is the
//! production implementation against the IG REST API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::types::{AccountMode, Bar, Order, Pair, PriceSeries, Resolution};

const DEMO_BASE_URL: &str = "https://demo-api.ig.com/gateway/deal";
const LIVE_BASE_URL: &str = "https://api.ig.com/gateway/deal";

/// Broker-side failures, kept per-pair recoverable by the orchestrator
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("session could not be established: {0}")]
    Session(String),

    #[error("price fetch failed: {0}")]
    Fetch(String),

    #[error("order submission failed: {0}")]
    Submit(String),
}

/// Broker acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealRef(pub String);

impl std::fmt::Display for DealRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Injected broker capability
///
/// The contract is synchronous; these are the only calls in a cycle that may
/// block or fail transiently.
pub trait Broker: Send + Sync {
    /// Fetch at least `min_bars` of trailing history for one pair
    fn fetch_series(
        &self,
        pair: &Pair,
        resolution: Resolution,
        min_bars: usize,
    ) -> Result<PriceSeries, BrokerError>;

    /// Submit a completed order, returning the broker's deal reference
    fn submit_order(&self, order: &Order) -> Result<DealRef, BrokerError>;
}

/// IG REST API client
///
/// Holds the CST and security tokens captured when the session was created.
#[derive(Debug)]
pub struct IgClient {
    http: reqwest::blocking::Client,
    base_url: &'static str,
    api_key: String,
    cst: String,
    security_token: String,
    currency_code: String,
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

/// Position ticket shape expected by POST /positions/otc
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PositionRequest<'a> {
    epic: &'a str,
    expiry: &'a str,
    direction: String,
    size: f64,
    order_type: &'a str,
    guaranteed_stop: bool,
    force_open: bool,
    stop_distance: f64,
    limit_distance: f64,
    currency_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionResponse {
    deal_reference: String,
}

#[derive(Debug, Deserialize)]
struct PriceHistoryResponse {
    prices: Vec<IgPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IgPrice {
    snapshot_time: String,
    open_price: PricePoint,
    high_price: PricePoint,
    low_price: PricePoint,
    close_price: PricePoint,
}

/// One side-quoted price; bid/ask can be null on thin bars
#[derive(Debug, Deserialize)]
struct PricePoint {
    bid: Option<f64>,
    ask: Option<f64>,
}

impl PricePoint {
    /// Mid price between bid and ask, the engine's working price
    fn mid(&self) -> Option<f64> {
        Some((self.bid? + self.ask?) / 2.0)
    }
}

impl IgClient {
    /// Create a session against the demo or live gateway and capture the
    /// CST / security tokens from the response headers.
    pub fn connect(config: &BrokerConfig, currency_code: &str) -> Result<Self, BrokerError> {
        let username = config
            .username
            .as_deref()
            .ok_or_else(|| BrokerError::Session("missing IG username".into()))?;
        let password = config
            .password
            .as_deref()
            .ok_or_else(|| BrokerError::Session("missing IG password".into()))?;
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| BrokerError::Session("missing IG API key".into()))?;

        let base_url = match config.account_mode {
            AccountMode::Demo => DEMO_BASE_URL,
            AccountMode::Live => LIVE_BASE_URL,
        };

        let http = reqwest::blocking::Client::new();
        let response = http
            .post(format!("{base_url}/session"))
            .header("X-IG-API-KEY", api_key)
            .header("Version", "2")
            .json(&SessionRequest {
                identifier: username,
                password,
            })
            .send()
            .map_err(|e| BrokerError::Session(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrokerError::Session(format!(
                "session rejected with status {}",
                response.status()
            )));
        }

        let header = |name: &str| -> Result<String, BrokerError> {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| BrokerError::Session(format!("missing {name} header")))
        };
        let cst = header("CST")?;
        let security_token = header("X-SECURITY-TOKEN")?;

        debug!(mode = %config.account_mode, "IG session established");

        Ok(IgClient {
            http,
            base_url,
            api_key: api_key.to_string(),
            cst,
            security_token,
            currency_code: currency_code.to_string(),
        })
    }

    fn auth_headers(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        request
            .header("X-IG-API-KEY", &self.api_key)
            .header("CST", &self.cst)
            .header("X-SECURITY-TOKEN", &self.security_token)
    }
}

impl Broker for IgClient {
    fn fetch_series(
        &self,
        pair: &Pair,
        resolution: Resolution,
        min_bars: usize,
    ) -> Result<PriceSeries, BrokerError> {
        let url = format!(
            "{}/prices/{}/{}/{}",
            self.base_url,
            pair.as_str(),
            resolution.as_ig(),
            min_bars
        );

        let response = self
            .auth_headers(self.http.get(&url))
            .header("Version", "2")
            .send()
            .map_err(|e| BrokerError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrokerError::Fetch(format!(
                "prices request for {pair} rejected with status {}",
                response.status()
            )));
        }

        let history: PriceHistoryResponse = response
            .json()
            .map_err(|e| BrokerError::Fetch(e.to_string()))?;

        series_from_response(pair.clone(), resolution, history)
    }

    fn submit_order(&self, order: &Order) -> Result<DealRef, BrokerError> {
        let ticket = PositionRequest {
            epic: order.pair.as_str(),
            expiry: "DFB",
            direction: order.direction.to_string(),
            size: order.size,
            order_type: "MARKET",
            guaranteed_stop: false,
            force_open: true,
            stop_distance: order.stop_distance,
            limit_distance: order.limit_distance,
            currency_code: &self.currency_code,
        };

        let response = self
            .auth_headers(self.http.post(format!("{}/positions/otc", self.base_url)))
            .header("Version", "2")
            .json(&ticket)
            .send()
            .map_err(|e| BrokerError::Submit(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrokerError::Submit(format!(
                "position for {} rejected with status {}",
                order.pair,
                response.status()
            )));
        }

        let ack: PositionResponse = response
            .json()
            .map_err(|e| BrokerError::Submit(e.to_string()))?;

        Ok(DealRef(ack.deal_reference))
    }
}

/// Normalize an IG price history payload into a validated series.
///
/// Bid/ask quotes collapse to mid prices; bars missing either side of any
/// quote are dropped rather than failing the whole fetch.
fn series_from_response(
    pair: Pair,
    resolution: Resolution,
    history: PriceHistoryResponse,
) -> Result<PriceSeries, BrokerError> {
    let mut bars = Vec::with_capacity(history.prices.len());

    for price in &history.prices {
        let timestamp = parse_snapshot_time(&price.snapshot_time)
            .ok_or_else(|| BrokerError::Fetch(format!("bad snapshot time {}", price.snapshot_time)))?;

        let (open, high, low, close) = match (
            price.open_price.mid(),
            price.high_price.mid(),
            price.low_price.mid(),
            price.close_price.mid(),
        ) {
            (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
            _ => {
                debug!(%pair, time = %price.snapshot_time, "skipping bar with one-sided quotes");
                continue;
            }
        };

        let bar = Bar::new(timestamp, open, high, low, close)
            .map_err(|e| BrokerError::Fetch(format!("invalid bar from broker: {e}")))?;
        bars.push(bar);
    }

    PriceSeries::from_bars(pair, resolution, bars)
        .map_err(|e| BrokerError::Fetch(format!("unordered history from broker: {e}")))
}

/// IG snapshot times come as "2024/03/01 14:00:00" (v2) or ISO-8601 (v3)
fn parse_snapshot_time(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y/%m/%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}
