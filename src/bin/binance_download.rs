//! Binance historical data downloader
//!
//! Downloads hourly spot close prices and writes aligned price/return
//! panels as CSV.
//!
//! # Usage
//!
//! ```bash
//! # Show the volume-ranked symbol universe
//! binance-download universe --top 20
//!
//! # Download the top-20 USDT universe from 2023-01-01
//! binance-download download --top 20 --start 2023-01-01
//!
//! # Download specific symbols and a date range
//! binance-download download --symbols BTCUSDT,ETHUSDT --start 2023-01-01 --end 2024-01-01
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use statarb_backtest::data::binance::{
    build_panels, interval_duration, BinanceClient, Kline,
};
use statarb_backtest::data::write_panel_csv;

/// Retry attempts per symbol before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Binance data downloader CLI.
#[derive(Parser)]
#[command(name = "binance-download")]
#[command(about = "Download historical spot prices from Binance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data output directory
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Use binance.us instead of binance.com
    #[arg(long)]
    us: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the volume-ranked symbol universe
    Universe {
        /// Number of symbols to keep
        #[arg(long, default_value_t = 20)]
        top: usize,

        /// Comma-separated allowed quote assets
        #[arg(long, default_value = "USDT")]
        quotes: String,
    },

    /// Download kline history and write price/return panels
    Download {
        /// Comma-separated symbols; defaults to the top-volume universe
        #[arg(long)]
        symbols: Option<String>,

        /// Universe size when --symbols is not given
        #[arg(long, default_value_t = 20)]
        top: usize,

        /// Comma-separated allowed quote assets
        #[arg(long, default_value = "USDT")]
        quotes: String,

        /// History start date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-01-01")]
        start: String,

        /// History end date (YYYY-MM-DD); defaults to exchange "now"
        #[arg(long)]
        end: Option<String>,

        /// Kline interval
        #[arg(long, default_value = "1h")]
        interval: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("statarb_backtest=info".parse()?)
                .add_directive("binance_download=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut client = BinanceClient::new(cli.us);

    match cli.command {
        Commands::Universe { top, quotes } => cmd_universe(&mut client, top, &quotes).await,
        Commands::Download {
            symbols,
            top,
            quotes,
            start,
            end,
            interval,
        } => {
            cmd_download(
                &mut client,
                cli.data_dir,
                symbols,
                top,
                &quotes,
                &start,
                end.as_deref(),
                &interval,
            )
            .await
        }
    }
}

fn parse_quotes(quotes: &str) -> Vec<String> {
    quotes
        .split(',')
        .map(|q| q.trim().to_uppercase())
        .filter(|q| !q.is_empty())
        .collect()
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date: {raw}"))?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .context("invalid midnight timestamp")?
        .and_utc())
}

async fn resolve_universe(
    client: &mut BinanceClient,
    top: usize,
    quotes: &str,
) -> Result<Vec<String>> {
    let allowed = parse_quotes(quotes);
    let candidates = client
        .spot_symbols(&allowed)
        .await
        .context("fetching exchange info")?;
    let universe = client
        .top_by_quote_volume(&candidates, top)
        .await
        .context("ranking by quote volume")?;
    if universe.is_empty() {
        bail!("no symbols matched the universe filters");
    }
    Ok(universe)
}

async fn cmd_universe(client: &mut BinanceClient, top: usize, quotes: &str) -> Result<()> {
    let universe = resolve_universe(client, top, quotes).await?;
    println!("Top {} symbols by 24h quote volume:", universe.len());
    for (rank, symbol) in universe.iter().enumerate() {
        println!("{:>3}. {symbol}", rank + 1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_download(
    client: &mut BinanceClient,
    data_dir: PathBuf,
    symbols: Option<String>,
    top: usize,
    quotes: &str,
    start: &str,
    end: Option<&str>,
    interval: &str,
) -> Result<()> {
    let bar_width =
        interval_duration(interval).with_context(|| format!("unsupported interval: {interval}"))?;
    let start_ts = parse_date(start)?;
    let end_ts = end.map(parse_date).transpose()?;

    let universe = match symbols {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        None => resolve_universe(client, top, quotes).await?,
    };
    println!("Universe ({} symbols): {}", universe.len(), universe.join(", "));

    let progress = ProgressBar::new(universe.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("invalid progress template")?,
    );

    let mut series: Vec<(String, Vec<Kline>)> = Vec::with_capacity(universe.len());
    for symbol in &universe {
        progress.set_message(symbol.clone());
        let mut fetched = None;
        for attempt in 0..MAX_ATTEMPTS {
            match client
                .klines_history(symbol, interval, start_ts, end_ts)
                .await
            {
                Ok(klines) => {
                    fetched = Some(klines);
                    break;
                }
                Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                    warn!(%symbol, %err, attempt, "kline fetch failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(2u64.pow(attempt + 1)))
                        .await;
                }
                Err(err) => {
                    warn!(%symbol, %err, "kline fetch failed, skipping symbol");
                }
            }
        }
        series.push((symbol.clone(), fetched.unwrap_or_default()));
        progress.inc(1);
    }
    progress.finish_and_clear();

    let (prices, returns) =
        build_panels(&series, start_ts, bar_width).context("assembling panels")?;
    println!(
        "Aligned panel: {} bars x {} symbols ({} -> {})",
        prices.n_rows(),
        prices.n_cols(),
        prices.index()[0],
        prices.index()[prices.n_rows() - 1]
    );

    std::fs::create_dir_all(&data_dir)?;
    let px_path = data_dir.join(format!("px_{interval}.csv"));
    let ret_path = data_dir.join(format!("ret_{interval}.csv"));
    write_panel_csv(&px_path, &prices)?;
    write_panel_csv(&ret_path, &returns)?;
    println!("Saved prices to {}", px_path.display());
    println!("Saved returns to {}", ret_path.display());
    Ok(())
}
