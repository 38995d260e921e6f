//! Binance spot API client for downloading historical hourly prices.
//!
//! API constraints:
//! - Klines: at most 1,000 rows per request, paginated by open time
//! - Public endpoints are IP rate-limited; requests are spaced out
//! - binance.com and binance.us expose the same spot surface
//!
//! The client covers universe selection (USDT-quoted spot symbols ranked by
//! 24h quote volume) and paginated kline history; panel assembly from the
//! fetched close series is a pure function at the bottom of the module.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::data::types::{Panel, PanelError};

/// Binance.com API base URL.
pub const BASE_URL_COM: &str = "https://api.binance.com";

/// Binance.US API base URL.
pub const BASE_URL_US: &str = "https://api.binance.us";

/// Maximum klines per request.
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Minimum interval between requests, well under the public IP limits.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(250);

/// Pagination hard stop per symbol.
const MAX_PAGES: usize = 200_000;

/// Stablecoin base assets excluded from the universe.
const STABLE_BASES: &[&str] = &["USDT", "USDC", "BUSD", "DAI", "TUSD", "FDUSD", "USD"];

/// Leveraged-token suffixes excluded from the universe.
const BAD_SUFFIXES: &[&str] = &["UPUSDT", "DOWNUSDT", "BULLUSDT", "BEARUSDT"];

#[derive(Error, Debug)]
pub enum BinanceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid response format: {0}")]
    InvalidResponse(String),

    #[error("no data returned for any symbol")]
    EmptyUniverse,

    #[error("every symbol starts after the requested history start")]
    LateUniverse,

    #[error(transparent)]
    Panel(#[from] PanelError),
}

#[derive(Debug, Clone, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    quote_volume: String,
}

/// One kline reduced to the fields the panel builder needs.
#[derive(Debug, Clone, Copy)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub close: f64,
}

/// Rate-limited Binance spot client.
pub struct BinanceClient {
    client: Client,
    base_url: String,
    last_request: Option<Instant>,
}

impl BinanceClient {
    /// Create a client against binance.us or binance.com.
    pub fn new(use_us: bool) -> Self {
        Self {
            client: Client::new(),
            base_url: if use_us { BASE_URL_US } else { BASE_URL_COM }.to_string(),
            last_request: None,
        }
    }

    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &mut self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BinanceError> {
        self.throttle().await;
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BinanceError::Api(format!("{status}: {body}")));
        }
        Ok(response.json::<T>().await?)
    }

    /// All tradable spot symbols quoted in one of `allowed_quotes`,
    /// excluding leveraged tokens and stablecoin bases.
    pub async fn spot_symbols(
        &mut self,
        allowed_quotes: &[String],
    ) -> Result<Vec<String>, BinanceError> {
        let info: ExchangeInfo = self.request("/api/v3/exchangeInfo", &[]).await?;
        Ok(info
            .symbols
            .iter()
            .filter(|s| is_tradable(s, allowed_quotes))
            .map(|s| s.symbol.clone())
            .collect())
    }

    /// Rank candidate symbols by 24h quote volume, keeping the top `top_n`.
    pub async fn top_by_quote_volume(
        &mut self,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<String>, BinanceError> {
        let tickers: Vec<Ticker24h> = self.request("/api/v3/ticker/24hr", &[]).await?;
        let mut ranked: Vec<(String, f64)> = tickers
            .into_iter()
            .filter(|t| candidates.contains(&t.symbol))
            .filter_map(|t| t.quote_volume.parse::<f64>().ok().map(|v| (t.symbol, v)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top_n);
        Ok(ranked.into_iter().map(|(s, _)| s).collect())
    }

    /// One page of klines starting at `start_ms`.
    async fn klines_page(
        &mut self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Kline>, BinanceError> {
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("startTime", start_ms.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(end) = end_ms {
            query.push(("endTime", end.to_string()));
        }
        let rows: Vec<Vec<serde_json::Value>> = self.request("/api/v3/klines", &query).await?;
        rows.iter().map(parse_kline).collect()
    }

    /// Full paginated kline history from `start` to `end` (or exchange
    /// "now"), advancing one millisecond past each page's last open time.
    pub async fn klines_history(
        &mut self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Kline>, BinanceError> {
        let mut start_ms = start.timestamp_millis();
        let end_ms = end.map(|e| e.timestamp_millis());
        let mut klines = Vec::new();
        let mut pages = 0usize;

        loop {
            let batch = self
                .klines_page(symbol, interval, start_ms, end_ms, MAX_KLINES_PER_REQUEST)
                .await?;
            if batch.is_empty() {
                break;
            }
            let last_open_ms = batch[batch.len() - 1].open_time.timestamp_millis();
            klines.extend(batch);
            pages += 1;

            if let Some(end) = end_ms {
                if last_open_ms >= end {
                    break;
                }
            }
            // A short page means we caught up to "now"; the next pull comes
            // back empty and exits the loop.
            start_ms = last_open_ms + 1;

            if pages >= MAX_PAGES {
                warn!(symbol, pages, "stopping pagination at the page cap");
                break;
            }
        }
        Ok(klines)
    }
}

fn is_tradable(symbol: &SymbolInfo, allowed_quotes: &[String]) -> bool {
    symbol.status == "TRADING"
        && symbol.permissions.iter().any(|p| p == "SPOT")
        && allowed_quotes.iter().any(|q| q == &symbol.quote_asset)
        && !BAD_SUFFIXES.iter().any(|suf| symbol.symbol.ends_with(suf))
        && !STABLE_BASES.iter().any(|base| base == &symbol.base_asset)
}

fn parse_kline(row: &Vec<serde_json::Value>) -> Result<Kline, BinanceError> {
    let open_ms = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| BinanceError::InvalidResponse("kline missing open time".to_string()))?;
    let close = row
        .get(4)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| BinanceError::InvalidResponse("kline missing close price".to_string()))?;
    let open_time = DateTime::<Utc>::from_timestamp_millis(open_ms)
        .ok_or_else(|| BinanceError::InvalidResponse(format!("bad open time: {open_ms}")))?;
    Ok(Kline { open_time, close })
}

/// Bar width for a Binance interval string.
pub fn interval_duration(interval: &str) -> Option<chrono::Duration> {
    let minutes = match interval {
        "1m" => 1,
        "3m" => 3,
        "5m" => 5,
        "15m" => 15,
        "30m" => 30,
        "1h" => 60,
        "2h" => 120,
        "4h" => 240,
        "6h" => 360,
        "8h" => 480,
        "12h" => 720,
        "1d" => 1440,
        _ => return None,
    };
    Some(chrono::Duration::minutes(minutes))
}

/// Assemble aligned price and log-return panels from per-symbol close
/// series.
///
/// Symbols whose history starts after `start` are dropped. The remaining
/// symbols are aligned on a uniform grid over their common window, gaps are
/// forward-filled, leading rows with any missing value are removed, and
/// log returns are taken bar over bar.
pub fn build_panels(
    series: &[(String, Vec<Kline>)],
    start: DateTime<Utc>,
    bar: chrono::Duration,
) -> Result<(Panel, Panel), BinanceError> {
    if series.iter().all(|(_, k)| k.is_empty()) {
        return Err(BinanceError::EmptyUniverse);
    }

    let mut kept: Vec<&(String, Vec<Kline>)> = Vec::new();
    for entry in series {
        let (symbol, klines) = entry;
        match klines.first() {
            Some(first) if first.open_time <= start => kept.push(entry),
            Some(first) => {
                warn!(
                    %symbol,
                    first_bar = %first.open_time,
                    "dropping late-start symbol"
                );
            }
            None => warn!(%symbol, "dropping symbol with no data"),
        }
    }
    if kept.is_empty() {
        return Err(BinanceError::LateUniverse);
    }

    let common_start = kept
        .iter()
        .filter_map(|(_, k)| k.first().map(|f| f.open_time))
        .fold(start, |acc, t| acc.max(t));
    let common_end = kept
        .iter()
        .filter_map(|(_, k)| k.last().map(|l| l.open_time))
        .min()
        .ok_or(BinanceError::EmptyUniverse)?;

    let mut grid = Vec::new();
    let mut t = common_start;
    while t <= common_end {
        grid.push(t);
        t = t + bar;
    }

    let symbols: Vec<String> = kept.iter().map(|(s, _)| s.clone()).collect();
    let mut prices = Array2::from_elem((grid.len(), symbols.len()), f64::NAN);
    for (j, (_, klines)) in kept.iter().enumerate() {
        let by_time: HashMap<i64, f64> = klines
            .iter()
            .map(|k| (k.open_time.timestamp_millis(), k.close))
            .collect();
        let mut held = f64::NAN;
        for (i, ts) in grid.iter().enumerate() {
            if let Some(&close) = by_time.get(&ts.timestamp_millis()) {
                held = close;
            }
            prices[[i, j]] = held;
        }
    }

    // Forward-filling leaves missing values only at the head of the grid.
    let first_full = (0..grid.len())
        .find(|&i| prices.row(i).iter().all(|x| x.is_finite()))
        .ok_or(BinanceError::EmptyUniverse)?;
    let rows = grid.len() - first_full;
    let price_values = prices.slice(ndarray::s![first_full.., ..]).to_owned();
    let price_index = grid[first_full..].to_vec();

    let mut ret_values = Array2::from_elem((rows - 1, symbols.len()), f64::NAN);
    for i in 1..rows {
        for j in 0..symbols.len() {
            ret_values[[i - 1, j]] = (price_values[[i, j]] / price_values[[i - 1, j]]).ln();
        }
    }
    let ret_index = price_index[1..].to_vec();

    let px = Panel::new(price_index, symbols.clone(), price_values)?;
    let ret = Panel::new(ret_index, symbols, ret_values)?;
    Ok((px, ret))
}
