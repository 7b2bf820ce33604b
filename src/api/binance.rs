use crate::api::GatewayError;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Instant;
use tokio::time::{sleep, Duration};

const BINANCE_API_BASE: &str = "https://api.binance.com";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const RATE_LIMIT_WAIT_SECS: u64 = 30;
const PRICE_CACHE_TTL_SECS: u64 = 2;
const REQUESTS_PER_SECOND: u32 = 10;

// Binance API error code classes
const RATE_LIMIT_ERROR_CODES: &[i64] = &[-1003, -1015];
const AUTH_ERROR_CODES: &[i64] = &[-1022, -2014, -2015];
const CANCEL_NOTHING_OPEN_CODE: i64 = -2011;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// 24h rolling ticker statistics for one symbol
#[derive(Debug, Clone)]
pub struct TickerStats {
    pub symbol: String,
    pub last_price: f64,
    pub price_change_percent: f64,
    pub volume: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicker {
    symbol: String,
    last_price: String,
    price_change_percent: String,
    volume: String,
}

/// One hourly candle row from the klines endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time_ms: i64,
    pub close: f64,
    pub volume: f64,
}

impl Kline {
    /// Klines arrive as positional JSON arrays:
    /// [openTime, open, high, low, close, volume, ...]
    pub fn from_raw(row: &[serde_json::Value]) -> Option<Self> {
        Some(Self {
            open_time_ms: row.first()?.as_i64()?,
            close: row.get(4)?.as_str()?.parse().ok()?,
            volume: row.get(5)?.as_str()?.parse().ok()?,
        })
    }
}

/// Average fill of an executed market order
#[derive(Debug, Clone)]
pub struct OrderFill {
    pub price: f64,
    pub quantity: f64,
    pub quote_quantity: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    executed_qty: String,
    #[serde(default)]
    cummulative_quote_qty: String,
    #[serde(default)]
    fills: Vec<RawFill>,
}

#[derive(Debug, Deserialize)]
struct RawFill {
    price: String,
    #[allow(dead_code)]
    qty: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub order_id: i64,
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(rename = "type", default)]
    pub order_type: String,
}

/// LOT_SIZE constraints for a symbol
#[derive(Debug, Clone, Copy)]
pub struct LotSize {
    pub step_size: f64,
    pub min_qty: f64,
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
    step_size: Option<String>,
    #[serde(default)]
    min_qty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceTicker {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

/// REST gateway to the exchange.
///
/// Every call is paced by a shared rate limiter and retried with
/// exponential backoff; rate-limit rejections wait out the longer
/// exchange-imposed window, auth rejections are never retried. Retry
/// policy lives here so callers stay policy-agnostic.
pub struct BinanceClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    limiter: DefaultDirectRateLimiter,
    price_cache: Mutex<HashMap<String, (f64, Instant)>>,
}

impl BinanceClient {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self::with_base_url(BINANCE_API_BASE, api_key, api_secret)
    }

    /// Construct against a non-default endpoint (testnet, mock server)
    pub fn with_base_url(base_url: &str, api_key: &str, api_secret: &str) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let quota = Quota::per_second(
            NonZeroU32::new(REQUESTS_PER_SECOND).expect("request quota must be non-zero"),
        );

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            limiter: RateLimiter::direct(quota),
            price_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Connectivity check used at startup
    pub async fn ping(&self) -> Result<(), GatewayError> {
        self.request(Method::GET, "/api/v3/ping", None, false)
            .await
            .map(|_| ())
    }

    /// Full 24h ticker set; rows that fail to parse are skipped
    pub async fn get_24h_tickers(&self) -> Result<Vec<TickerStats>, GatewayError> {
        let body = self
            .request(Method::GET, "/api/v3/ticker/24hr", None, false)
            .await?;

        let raw: Vec<RawTicker> =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(raw
            .into_iter()
            .filter_map(|t| {
                Some(TickerStats {
                    last_price: t.last_price.parse().ok()?,
                    price_change_percent: t.price_change_percent.parse().ok()?,
                    volume: t.volume.parse().ok()?,
                    symbol: t.symbol,
                })
            })
            .collect())
    }

    /// The most recent hourly candles, oldest first
    pub async fn get_recent_klines(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, GatewayError> {
        let query = format!("symbol={}&interval=1h&limit={}", symbol, limit);
        let body = self
            .request(Method::GET, "/api/v3/klines", Some(query), false)
            .await?;

        let rows: Vec<Vec<serde_json::Value>> =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(rows.iter().filter_map(|r| Kline::from_raw(r)).collect())
    }

    /// Current price with a short-lived cache; on exhausted retries the
    /// stale cache entry is served rather than nothing.
    pub async fn get_price(&self, symbol: &str) -> Result<f64, GatewayError> {
        if let Some(price) = self.cached_price(symbol) {
            return Ok(price);
        }

        let query = format!("symbol={}", symbol);
        match self
            .request(Method::GET, "/api/v3/ticker/price", Some(query), false)
            .await
        {
            Ok(body) => {
                let ticker: PriceTicker = serde_json::from_str(&body)
                    .map_err(|e| GatewayError::Malformed(e.to_string()))?;
                let price: f64 = ticker
                    .price
                    .parse()
                    .map_err(|_| GatewayError::Malformed(format!("bad price: {}", ticker.price)))?;

                self.price_cache
                    .lock()
                    .unwrap()
                    .insert(symbol.to_string(), (price, Instant::now()));
                Ok(price)
            }
            Err(e) => {
                let stale = self
                    .price_cache
                    .lock()
                    .unwrap()
                    .get(symbol)
                    .map(|(price, _)| *price);
                match stale {
                    Some(price) => {
                        tracing::warn!(
                            "Price fetch failed for {} ({}), serving stale cache",
                            symbol,
                            e
                        );
                        Ok(price)
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Free balance for an asset. `Ok(0.0)` is a real zero balance; an
    /// API failure is an `Err`. Callers must not conflate the two.
    pub async fn get_account_balance(&self, asset: &str) -> Result<f64, GatewayError> {
        let body = self
            .request(Method::GET, "/api/v3/account", None, true)
            .await?;

        let account: AccountInfo =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        match account.balances.iter().find(|b| b.asset == asset) {
            Some(balance) => balance.free.parse().map_err(|_| {
                GatewayError::Malformed(format!("bad balance for {}: {}", asset, balance.free))
            }),
            None => Ok(0.0),
        }
    }

    /// Market buy spending `quote_amount` of the quote currency
    pub async fn place_market_buy(
        &self,
        symbol: &str,
        quote_amount: f64,
    ) -> Result<OrderFill, GatewayError> {
        let query = format!(
            "symbol={}&side=BUY&type=MARKET&quoteOrderQty={}",
            symbol,
            format_amount(quote_amount)
        );
        let body = self
            .request(Method::POST, "/api/v3/order", Some(query), true)
            .await?;

        tracing::info!("Market buy order placed for {}", symbol);
        parse_fill(&body)
    }

    /// Market sell of an exact base-asset quantity
    pub async fn place_market_sell(
        &self,
        symbol: &str,
        quantity: f64,
    ) -> Result<OrderFill, GatewayError> {
        let query = format!(
            "symbol={}&side=SELL&type=MARKET&quantity={}",
            symbol,
            format_amount(quantity)
        );
        let body = self
            .request(Method::POST, "/api/v3/order", Some(query), true)
            .await?;

        tracing::info!("Market sell order placed for {}", symbol);
        parse_fill(&body)
    }

    pub async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        let query = format!("symbol={}", symbol);
        let body = self
            .request(Method::GET, "/api/v3/openOrders", Some(query), true)
            .await?;

        serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    /// Cancel every resting order for a symbol. The exchange rejects the
    /// call when nothing is open (code -2011); that counts as success.
    pub async fn cancel_all_orders(&self, symbol: &str) -> Result<(), GatewayError> {
        let query = format!("symbol={}", symbol);
        match self
            .request(Method::DELETE, "/api/v3/openOrders", Some(query), true)
            .await
        {
            Ok(_) => {
                tracing::info!("Cancelled all open orders for {}", symbol);
                Ok(())
            }
            Err(GatewayError::Api { code, .. }) if code == CANCEL_NOTHING_OPEN_CODE => {
                tracing::debug!("No open orders to cancel for {}", symbol);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// LOT_SIZE filter for a symbol, from exchange metadata
    pub async fn get_lot_size(&self, symbol: &str) -> Result<LotSize, GatewayError> {
        let query = format!("symbol={}", symbol);
        let body = self
            .request(Method::GET, "/api/v3/exchangeInfo", Some(query), false)
            .await?;

        let info: ExchangeInfo =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let filter = info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .and_then(|s| s.filters.iter().find(|f| f.filter_type == "LOT_SIZE"))
            .ok_or_else(|| {
                GatewayError::Malformed(format!("no LOT_SIZE filter for {}", symbol))
            })?;

        let step_size = filter
            .step_size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| GatewayError::Malformed(format!("bad stepSize for {}", symbol)))?;
        let min_qty = filter
            .min_qty
            .as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| GatewayError::Malformed(format!("bad minQty for {}", symbol)))?;

        Ok(LotSize { step_size, min_qty })
    }

    fn cached_price(&self, symbol: &str) -> Option<f64> {
        let cache = self.price_cache.lock().unwrap();
        cache
            .get(symbol)
            .and_then(|(price, at)| (at.elapsed().as_secs() < PRICE_CACHE_TTL_SECS).then_some(*price))
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<String>,
        signed: bool,
    ) -> Result<String, GatewayError> {
        for attempt in 1..=MAX_RETRIES {
            self.limiter.until_ready().await;

            let mut full_query = query.clone().unwrap_or_default();
            if signed {
                if !full_query.is_empty() {
                    full_query.push('&');
                }
                full_query.push_str(&format!("timestamp={}", Utc::now().timestamp_millis()));
                let signature = self.sign(&full_query);
                full_query.push_str(&format!("&signature={}", signature));
            }

            let mut url = format!("{}{}", self.base_url, path);
            if !full_query.is_empty() {
                url.push('?');
                url.push_str(&full_query);
            }

            let mut req = self.http.request(method.clone(), &url);
            if signed {
                req = req.header("X-MBX-APIKEY", &self.api_key);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let backoff =
                            Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                        tracing::warn!(
                            "Request to {} failed ({}). Retrying in {:?} (attempt {}/{})",
                            path,
                            e,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        sleep(backoff).await;
                        continue;
                    }
                    return Err(GatewayError::Http(e));
                }
            };

            if response.status().is_success() {
                return response.text().await.map_err(GatewayError::Http);
            }

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(e) => (e.code, e.msg),
                Err(_) => (0, format!("HTTP {}: {}", status, body)),
            };

            // Never retry on bad credentials
            if AUTH_ERROR_CODES.contains(&code) {
                tracing::error!("Authentication error on {} - not retrying: {}", path, message);
                return Err(GatewayError::Auth { code, message });
            }

            if RATE_LIMIT_ERROR_CODES.contains(&code) {
                if attempt < MAX_RETRIES {
                    tracing::warn!(
                        "Rate limit hit on {} (code {}). Waiting {}s before retry ({}/{})",
                        path,
                        code,
                        RATE_LIMIT_WAIT_SECS,
                        attempt,
                        MAX_RETRIES
                    );
                    sleep(Duration::from_secs(RATE_LIMIT_WAIT_SECS)).await;
                    continue;
                }
                return Err(GatewayError::Transient(format!(
                    "rate limit exceeded on {} (code {})",
                    path, code
                )));
            }

            if status.is_server_error() && attempt < MAX_RETRIES {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                tracing::warn!(
                    "Exchange error {} on {} (attempt {}/{}). Retrying in {:?}",
                    status,
                    path,
                    attempt,
                    MAX_RETRIES,
                    backoff
                );
                sleep(backoff).await;
                continue;
            }

            return Err(GatewayError::Api { code, message });
        }

        Err(GatewayError::Transient(format!(
            "all retry attempts exhausted for {}",
            path
        )))
    }
}

fn parse_fill(body: &str) -> Result<OrderFill, GatewayError> {
    let order: RawOrder =
        serde_json::from_str(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let quantity: f64 = order.executed_qty.parse().unwrap_or(0.0);
    let quote_quantity: f64 = order.cummulative_quote_qty.parse().unwrap_or(0.0);

    // Prefer the first fill's price; fall back to the average implied by
    // the cumulative quote amount.
    let price = match order.fills.first() {
        Some(fill) => fill.price.parse().unwrap_or(0.0),
        None if quantity > 0.0 => quote_quantity / quantity,
        None => 0.0,
    };

    Ok(OrderFill {
        price,
        quantity,
        quote_quantity,
    })
}

/// Trim trailing zeros so the exchange accepts the amount
fn format_amount(amount: f64) -> String {
    let s = format!("{:.8}", amount);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_client(url: &str) -> BinanceClient {
        BinanceClient::with_base_url(url, "test-key", "test-secret")
    }

    #[test]
    fn test_format_amount_trims_zeros() {
        assert_eq!(format_amount(250.0), "250");
        assert_eq!(format_amount(0.56), "0.56");
        assert_eq!(format_amount(12.345), "12.345");
    }

    #[test]
    fn test_kline_from_raw() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1700000000000, "100.0", "110.0", "95.0", "105.5", "12345.6", 1700003599999]"#,
        )
        .unwrap();

        let kline = Kline::from_raw(&row).unwrap();
        assert_eq!(kline.open_time_ms, 1_700_000_000_000);
        assert_eq!(kline.close, 105.5);
        assert_eq!(kline.volume, 12345.6);
    }

    #[test]
    fn test_kline_from_raw_rejects_short_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(r#"[1700000000000, "1.0"]"#).unwrap();
        assert!(Kline::from_raw(&row).is_none());
    }

    #[test]
    fn test_parse_fill_prefers_fill_price() {
        let body = r#"{
            "executedQty": "120.0",
            "cummulativeQuoteQty": "250.0",
            "fills": [{"price": "2.0", "qty": "120.0"}]
        }"#;

        let fill = parse_fill(body).unwrap();
        assert_eq!(fill.price, 2.0);
        assert_eq!(fill.quantity, 120.0);
        assert_eq!(fill.quote_quantity, 250.0);
    }

    #[test]
    fn test_parse_fill_falls_back_to_average() {
        let body = r#"{"executedQty": "100.0", "cummulativeQuoteQty": "250.0", "fills": []}"#;
        let fill = parse_fill(body).unwrap();
        assert_eq!(fill.price, 2.5);
    }

    #[test]
    fn test_parse_fill_unfilled_order_is_zero() {
        let body = r#"{"executedQty": "0", "cummulativeQuoteQty": "0", "fills": []}"#;
        let fill = parse_fill(body).unwrap();
        assert_eq!(fill.quantity, 0.0);
        assert_eq!(fill.price, 0.0);
    }

    #[tokio::test]
    async fn test_get_24h_tickers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[
                    {"symbol": "ABCUSDT", "lastPrice": "2.5", "priceChangePercent": "12.3", "volume": "1000.0"},
                    {"symbol": "XYZUSDT", "lastPrice": "0.5", "priceChangePercent": "-3.1", "volume": "2000.0"}
                ]"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let tickers = client.get_24h_tickers().await.unwrap();

        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].symbol, "ABCUSDT");
        assert_eq!(tickers[0].price_change_percent, 12.3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_recent_klines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[
                    [1700000000000, "1.0", "1.2", "0.9", "1.1", "500.0", 1700003599999],
                    [1700003600000, "1.1", "1.3", "1.0", "1.25", "750.0", 1700007199999]
                ]"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let klines = client.get_recent_klines("ABCUSDT", 2).await.unwrap();

        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].close, 1.1);
        assert_eq!(klines[1].open_time_ms, 1_700_003_600_000);
    }

    #[tokio::test]
    async fn test_get_price_uses_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"symbol": "ABCUSDT", "price": "3.14"}"#)
            .expect(1) // second call must come from the cache
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert_eq!(client.get_price("ABCUSDT").await.unwrap(), 3.14);
        assert_eq!(client.get_price("ABCUSDT").await.unwrap(), 3.14);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_account_balance_missing_asset_is_zero() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/account")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"balances": [{"asset": "BTC", "free": "0.5", "locked": "0"}]}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let balance = client.get_account_balance("USDT").await.unwrap();
        assert_eq!(balance, 0.0);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/account")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"code": -2015, "msg": "Invalid API-key, IP, or permissions."}"#)
            .expect(1) // a retry here would be a bug
            .create_async()
            .await;

        let client = test_client(&server.url());
        let result = client.get_account_balance("USDT").await;

        assert!(matches!(result, Err(GatewayError::Auth { code: -2015, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_orders_tolerates_nothing_open() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/v3/openOrders")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code": -2011, "msg": "Unknown order sent."}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(client.cancel_all_orders("ABCUSDT").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_lot_size() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{
                    "symbols": [{
                        "symbol": "ABCUSDT",
                        "filters": [
                            {"filterType": "PRICE_FILTER", "minPrice": "0.01"},
                            {"filterType": "LOT_SIZE", "minQty": "0.10", "maxQty": "9000.0", "stepSize": "0.10"}
                        ]
                    }]
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let lot = client.get_lot_size("ABCUSDT").await.unwrap();
        assert_eq!(lot.step_size, 0.1);
        assert_eq!(lot.min_qty, 0.1);
    }

    #[tokio::test]
    async fn test_market_buy_parses_fill() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v3/order")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{
                    "symbol": "ABCUSDT",
                    "orderId": 42,
                    "status": "FILLED",
                    "executedQty": "125.0",
                    "cummulativeQuoteQty": "250.0",
                    "fills": [{"price": "2.0", "qty": "125.0", "commission": "0"}]
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let fill = client.place_market_buy("ABCUSDT", 250.0).await.unwrap();
        assert_eq!(fill.price, 2.0);
        assert_eq!(fill.quantity, 125.0);
    }
}
