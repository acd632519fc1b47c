use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::config::{Credentials, ExchangeConfig};
use crate::error::GatewayError;
use crate::execution::{MarketDataGateway, OrderGateway};
use crate::models::{LotConstraint, OrderResult, TradeSide};

// Binance Spot REST API
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const INVALID_SYMBOL_CODE: i64 = -1121;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot client implementing both gateways.
///
/// Clones share the rate limiter and the server clock offset.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    time_offset_ms: Arc<AtomicI64>,
    rate_limiter: Arc<BinanceRateLimiter>,
    retry_backoff: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTime {
    server_time: i64,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    step_size: Option<Decimal>,
    #[serde(default)]
    min_qty: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    symbol: String,
    order_id: i64,
    status: String,
    executed_qty: Decimal,
    transact_time: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceClient {
    /// Build a client; credentials are only needed for account and order calls
    pub fn new(
        config: &ExchangeConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        let rpm = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: config.recv_window_ms,
            time_offset_ms: Arc::new(AtomicI64::new(0)),
            rate_limiter,
            retry_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the initial retry backoff (doubles on each attempt)
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Measure the offset between local and server clock.
    ///
    /// The offset is added to every signed request timestamp so requests are
    /// not rejected for falling outside `recvWindow`.
    pub async fn sync_time(&self) -> Result<i64, GatewayError> {
        let server: ServerTime = self.get("/api/v3/time", "", false).await?;
        let offset = server.server_time - Utc::now().timestamp_millis();
        self.time_offset_ms.store(offset, Ordering::Relaxed);

        tracing::info!("Synchronized clock with Binance, offset {}ms", offset);
        Ok(offset)
    }

    pub fn time_offset_ms(&self) -> i64 {
        self.time_offset_ms.load(Ordering::Relaxed)
    }

    /// HMAC-SHA256 signature of a query string, hex encoded
    fn sign(secret: &str, query: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| GatewayError::MissingCredentials(e.to_string()))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Append recvWindow, timestamp and signature to the query
    fn signed_query(&self, query: &str) -> Result<String, GatewayError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            GatewayError::MissingCredentials("signed endpoint requires an API key".to_string())
        })?;

        let timestamp = Utc::now().timestamp_millis() + self.time_offset_ms();
        let mut params = query.to_string();
        if !params.is_empty() {
            params.push('&');
        }
        params.push_str(&format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms, timestamp
        ));

        let signature = Self::sign(&credentials.api_secret, &params)?;
        params.push_str(&format!("&signature={}", signature));
        Ok(params)
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &str,
        signed: bool,
    ) -> Result<String, GatewayError> {
        self.rate_limiter.until_ready().await;

        let query = if signed {
            self.signed_query(query)?
        } else {
            query.to_string()
        };

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let mut request = self.client.request(method, &url);
        if let Some(credentials) = &self.credentials {
            request = request.header("X-MBX-APIKEY", &credentials.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(map_error(status, &body))
        }
    }

    /// GET with retry on transient failures (transport errors, 429, 5xx)
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
        signed: bool,
    ) -> Result<T, GatewayError> {
        let mut backoff = self.retry_backoff;

        for attempt in 1..=MAX_RETRIES {
            match self.send_once(Method::GET, path, query, signed).await {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::info!("✓ {} succeeded after {} attempts", path, attempt);
                    }
                    return Ok(serde_json::from_str(&body)?);
                }
                Err(GatewayError::Network(msg)) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "⚠ {} failed ({}), retrying in {:?} (attempt {}/{})",
                        path,
                        msg,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        Err(GatewayError::Network(format!(
            "{} failed after {} attempts",
            path, MAX_RETRIES
        )))
    }

    /// Orders are sent exactly once; a failure is reported, never replayed
    async fn place_market_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
    ) -> Result<OrderResult, GatewayError> {
        let query = format!(
            "symbol={}&side={}&type=MARKET&quantity={}",
            symbol,
            side.as_str(),
            quantity.normalize()
        );

        let body = self
            .send_once(Method::POST, "/api/v3/order", &query, true)
            .await?;
        let response: OrderResponse = serde_json::from_str(&body)?;

        Ok(OrderResult {
            order_id: response.order_id.to_string(),
            symbol: response.symbol,
            side,
            executed_qty: response.executed_qty,
            status: response.status,
            transact_time: millis_to_datetime(response.transact_time),
        })
    }
}

fn map_error(status: StatusCode, body: &str) -> GatewayError {
    let api_error = serde_json::from_str::<ApiErrorBody>(body).ok();

    match api_error {
        Some(err) if err.code == INVALID_SYMBOL_CODE => GatewayError::NotFound(err.msg),
        _ if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
            GatewayError::Network(format!("HTTP {}: {}", status, body))
        }
        Some(err) => GatewayError::ExchangeRejected {
            code: err.code,
            msg: err.msg,
        },
        None if status == StatusCode::NOT_FOUND => GatewayError::NotFound(body.to_string()),
        None => GatewayError::InvalidResponse(format!("HTTP {}: {}", status, body)),
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn parse_close(kline: &[serde_json::Value]) -> Result<Decimal, GatewayError> {
    let raw = kline
        .get(4)
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::InvalidResponse("kline without close price".to_string()))?;

    raw.parse::<Decimal>()
        .map_err(|e| GatewayError::InvalidResponse(format!("bad close price {}: {}", raw, e)))
}

#[async_trait]
impl MarketDataGateway for BinanceClient {
    async fn current_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let ticker: TickerPrice = self
            .get("/api/v3/ticker/price", &format!("symbol={}", symbol), false)
            .await?;
        Ok(ticker.price)
    }

    async fn historical_closes(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Decimal>, GatewayError> {
        let query = format!("symbol={}&interval={}&limit={}", symbol, interval, limit);
        let klines: Vec<Vec<serde_json::Value>> = self.get("/api/v3/klines", &query, false).await?;

        klines.iter().map(|k| parse_close(k)).collect()
    }

    async fn lot_constraint(&self, symbol: &str) -> Result<LotConstraint, GatewayError> {
        let info: ExchangeInfo = self
            .get("/api/v3/exchangeInfo", &format!("symbol={}", symbol), false)
            .await?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| GatewayError::NotFound(format!("Symbol {} not listed", symbol)))?;

        let lot = symbol_info
            .filters
            .into_iter()
            .find(|f| f.filter_type == "LOT_SIZE")
            .ok_or_else(|| GatewayError::NotFound(format!("No LOT_SIZE filter for {}", symbol)))?;

        let step_size = lot.step_size.ok_or_else(|| {
            GatewayError::InvalidResponse(format!("LOT_SIZE for {} has no stepSize", symbol))
        })?;

        Ok(LotConstraint {
            step_size,
            min_qty: lot.min_qty.unwrap_or(Decimal::ZERO),
        })
    }
}

#[async_trait]
impl OrderGateway for BinanceClient {
    async fn free_balance(&self, asset: &str) -> Result<Decimal, GatewayError> {
        let account: AccountInfo = self.get("/api/v3/account", "omitZeroBalances=true", true).await?;

        let free = account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO);

        tracing::debug!("Free {} balance: {}", asset, free);
        Ok(free)
    }

    async fn market_buy(&self, symbol: &str, quantity: Decimal) -> Result<OrderResult, GatewayError> {
        self.place_market_order(symbol, TradeSide::Buy, quantity).await
    }

    async fn market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderResult, GatewayError> {
        self.place_market_order(symbol, TradeSide::Sell, quantity).await
    }
}
