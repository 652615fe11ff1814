//! Binance USD-M futures implementation of [`GridExchange`]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use reqwest::{Method, Url};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::BinanceSettings;

use super::errors::{GridError, GridResult};
use super::executor::{GridExchange, LEVERAGE_ENDPOINT};
use super::market::MarketRules;
use super::types::OrderSide;

type HmacSha256 = Hmac<Sha256>;

const EXCHANGE_INFO_ENDPOINT: &str = "/fapi/v1/exchangeInfo";
const ORDER_ENDPOINT: &str = "/fapi/v1/order";

/// "ReduceOnly Order is rejected."
const CODE_REDUCE_ONLY_REJECTED: i64 = -2022;
/// "Parameter '%s' sent when not required."
const CODE_PARAM_NOT_REQUIRED: i64 = -1106;
/// "Reduce only order failed."
const CODE_REDUCE_ONLY_FAILED: i64 = -4118;

/// HMAC-SHA256 signature of a query string, hex encoded
pub fn sign(secret: &str, query: &str) -> GridResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GridError::Configuration(format!("invalid api secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Map a Binance error payload to a grid error
///
/// Only reduce-only rejections become [`GridError::InvalidOrder`].
pub fn map_api_error(code: i64, message: String) -> GridError {
    let reduce_only = match code {
        CODE_REDUCE_ONLY_REJECTED | CODE_REDUCE_ONLY_FAILED => true,
        CODE_PARAM_NOT_REQUIRED => message.to_lowercase().contains("reduceonly"),
        _ => false,
    };

    if reduce_only {
        GridError::InvalidOrder { code, message }
    } else {
        GridError::Exchange { code, message }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    #[serde(default)]
    contract_type: String,
    #[serde(default)]
    price_precision: Option<u32>,
    #[serde(default)]
    quantity_precision: Option<u32>,
    #[serde(default)]
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: i64,
}

/// Market rules for every listed symbol plus the perpetual subset
#[derive(Debug, Clone, Default)]
pub struct MarketCatalog {
    pub rules: HashMap<String, MarketRules>,
    /// Sorted perpetual contract symbols
    pub perpetuals: Vec<String>,
}

impl MarketCatalog {
    /// Parse a `/fapi/v1/exchangeInfo` payload
    pub fn from_exchange_info(payload: serde_json::Value) -> GridResult<Self> {
        let info: ExchangeInfo = serde_json::from_value(payload)?;
        let mut catalog = MarketCatalog::default();

        for symbol in info.symbols {
            if symbol.contract_type == "PERPETUAL" {
                catalog.perpetuals.push(symbol.symbol.clone());
            }
            let rules = parse_rules(&symbol);
            catalog.rules.insert(symbol.symbol, rules);
        }

        catalog.perpetuals.sort();
        Ok(catalog)
    }
}

fn filter_value(filter: &serde_json::Value, key: &str) -> Option<f64> {
    filter
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
}

fn parse_rules(symbol: &SymbolInfo) -> MarketRules {
    let mut min_price = 0.0;
    let mut max_price = f64::MAX;
    let mut tick_size = None;
    let mut step_size = None;
    let mut min_notional = None;

    for filter in &symbol.filters {
        match filter.get("filterType").and_then(|v| v.as_str()) {
            Some("PRICE_FILTER") => {
                min_price = filter_value(filter, "minPrice").unwrap_or(0.0);
                max_price = filter_value(filter, "maxPrice")
                    .filter(|p| *p > 0.0)
                    .unwrap_or(f64::MAX);
                tick_size = filter_value(filter, "tickSize").filter(|t| *t > 0.0);
            }
            Some("LOT_SIZE") => {
                step_size = filter_value(filter, "stepSize").filter(|s| *s > 0.0);
            }
            Some("MIN_NOTIONAL") => {
                min_notional = filter_value(filter, "notional");
            }
            _ => {}
        }
    }

    let from_precision = |p: Option<u32>| p.map(|p| 10f64.powi(-(p as i32)));

    MarketRules {
        symbol: symbol.symbol.clone(),
        min_price,
        max_price,
        min_notional,
        step_size: step_size
            .or_else(|| from_precision(symbol.quantity_precision))
            .unwrap_or(1.0),
        tick_size: tick_size
            .or_else(|| from_precision(symbol.price_precision))
            .unwrap_or(0.0),
    }
}

/// Binance USD-M futures REST client
pub struct BinanceFuturesExchange {
    client: reqwest::Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    recv_window_ms: u64,
    min_request_interval: Duration,
    max_retries: u32,
    retry_base_delay_ms: u64,
    last_request: Mutex<Option<Instant>>,
    catalog: RwLock<Option<Arc<MarketCatalog>>>,
}

impl BinanceFuturesExchange {
    pub fn new(settings: &BinanceSettings) -> GridResult<Self> {
        settings.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            recv_window_ms: settings.recv_window_ms,
            min_request_interval: Duration::from_millis(settings.min_request_interval_ms),
            max_retries: settings.max_retries.max(1),
            retry_base_delay_ms: settings.retry_base_delay_ms,
            last_request: Mutex::new(None),
            catalog: RwLock::new(None),
        })
    }

    /// Build a signed URL; the signature covers every parameter in order
    pub fn signed_url(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        timestamp_ms: i64,
    ) -> GridResult<Url> {
        let mut url = self.url(endpoint)?;
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair("recvWindow", &self.recv_window_ms.to_string())
            .append_pair("timestamp", &timestamp_ms.to_string());

        let query = url.query().unwrap_or_default().to_string();
        let signature = sign(&self.api_secret, &query)?;
        url.query_pairs_mut().append_pair("signature", &signature);
        Ok(url)
    }

    fn url(&self, endpoint: &str) -> GridResult<Url> {
        Url::parse(&format!("{}{}", self.base_url, endpoint))
            .map_err(|e| GridError::Configuration(format!("invalid base url: {}", e)))
    }

    /// Space requests at least `min_request_interval` apart
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn read_response(response: reqwest::Response) -> GridResult<serde_json::Value> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => Err(map_api_error(err.code, err.msg)),
            Err(_) => Err(GridError::Exchange {
                code: status.as_u16() as i64,
                message: body,
            }),
        }
    }

    async fn public_get(&self, endpoint: &str) -> GridResult<serde_json::Value> {
        let url = self.url(endpoint)?;
        self.throttle().await;
        let response = self.client.get(url).send().await?;
        Self::read_response(response).await
    }

    /// Retry read-only calls with exponential backoff
    async fn with_retry<T, F, Fut>(&self, operation: F) -> GridResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = GridResult<T>>,
    {
        let mut attempts = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.max_retries {
                        return Err(e);
                    }
                    let delay = self.retry_base_delay_ms * 2u64.pow(attempts - 1);
                    warn!(
                        "Request failed (attempt {}/{}), retrying in {}ms: {}",
                        attempts, self.max_retries, delay, e
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Market catalog, fetched once and cached
    pub async fn catalog(&self) -> GridResult<Arc<MarketCatalog>> {
        if let Some(catalog) = self.catalog.read().await.as_ref() {
            return Ok(catalog.clone());
        }

        let mut cached = self.catalog.write().await;
        if let Some(catalog) = cached.as_ref() {
            return Ok(catalog.clone());
        }

        let payload = self
            .with_retry(|| self.public_get(EXCHANGE_INFO_ENDPOINT))
            .await?;
        let catalog = Arc::new(MarketCatalog::from_exchange_info(payload)?);
        info!(
            "Loaded {} markets ({} perpetual)",
            catalog.rules.len(),
            catalog.perpetuals.len()
        );
        *cached = Some(catalog.clone());
        Ok(catalog)
    }

    async fn submit_order(&self, params: Vec<(String, String)>) -> GridResult<String> {
        let response = self
            .signed_request(Method::POST, ORDER_ENDPOINT, params)
            .await?;
        let order: OrderResponse = serde_json::from_value(response)?;
        Ok(order.order_id.to_string())
    }

    async fn order_params(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: &str,
        quantity: f64,
    ) -> GridResult<(MarketRules, Vec<(String, String)>)> {
        let rules = self.market_rules(symbol).await?;
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), side.as_str().to_string()),
            ("type".to_string(), order_type.to_string()),
            ("quantity".to_string(), rules.format_amount(quantity)),
            (
                "newClientOrderId".to_string(),
                Uuid::new_v4().simple().to_string(),
            ),
        ];
        Ok((rules, params))
    }
}

#[async_trait]
impl GridExchange for BinanceFuturesExchange {
    async fn market_rules(&self, symbol: &str) -> GridResult<MarketRules> {
        self.catalog()
            .await?
            .rules
            .get(symbol)
            .cloned()
            .ok_or_else(|| GridError::AssetNotFound(symbol.to_string()))
    }

    async fn perpetual_symbols(&self) -> GridResult<Vec<String>> {
        Ok(self.catalog().await?.perpetuals.clone())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> GridResult<()> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("leverage".to_string(), leverage.to_string()),
        ];
        self.signed_request(Method::POST, LEVERAGE_ENDPOINT, params)
            .await?;
        Ok(())
    }

    async fn signed_request(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> GridResult<serde_json::Value> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let url = self.signed_url(endpoint, &params, timestamp)?;
        debug!("{} {}", method, endpoint);

        self.throttle().await;
        let response = self
            .client
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> GridResult<String> {
        let (rules, mut params) = self.order_params(symbol, side, "LIMIT", quantity).await?;
        params.push(("price".to_string(), rules.format_price(price)));
        params.push(("timeInForce".to_string(), "GTC".to_string()));
        self.submit_order(params).await
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> GridResult<String> {
        let (rules, mut params) = self
            .order_params(symbol, side, "STOP_MARKET", quantity)
            .await?;
        params.push(("stopPrice".to_string(), rules.format_price(stop_price)));
        self.submit_order(params).await
    }

    async fn place_reduce_only_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> GridResult<String> {
        let (rules, mut params) = self.order_params(symbol, side, "LIMIT", quantity).await?;
        params.push(("price".to_string(), rules.format_price(price)));
        params.push(("timeInForce".to_string(), "GTC".to_string()));
        params.push(("reduceOnly".to_string(), "true".to_string()));
        self.submit_order(params).await
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> GridResult<()> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        self.signed_request(Method::DELETE, ORDER_ENDPOINT, params)
            .await?;
        Ok(())
    }
}
