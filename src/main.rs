//! # Run a full-sample backtest of one sleeve
//! statarb-backtest run --config config/default.toml --strategy reversal
//!
//! # Run a single-sleeve walk-forward
//! statarb-backtest walkforward --config config/default.toml --strategy reversal
//!
//! # Run the two-sleeve blended walk-forward
//! statarb-backtest blend --config config/default.toml

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use statarb_backtest::backtest::{apply_schedule, backtest, rebalance_mask};
use statarb_backtest::config::AppConfig;
use statarb_backtest::data::{
    load_panel_csv, write_blend_records_csv, write_fold_records_csv, write_series_csv, Panel,
};
use statarb_backtest::metrics::{max_drawdown, nw_mean_tstat, perf_summary};
use statarb_backtest::walkforward::{run_walk_forward, run_walk_forward_blended, SleeveSpec};

#[derive(Parser)]
#[command(name = "statarb-backtest")]
#[command(about = "Cross-sectional stat-arb walk-forward backtester")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Data directory override (defaults to the config's [data] dir)
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full-sample backtest of one sleeve
    Run {
        /// Strategy family: reversal or momentum
        #[arg(short, long, default_value = "reversal")]
        strategy: String,
    },

    /// Run a single-sleeve walk-forward
    Walkforward {
        /// Strategy family: reversal or momentum
        #[arg(short, long, default_value = "reversal")]
        strategy: String,

        /// Output directory for fold table and stitched series
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Run the two-sleeve blended walk-forward
    Blend {
        /// Output directory for fold table and stitched series
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("statarb_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let data_dir = cli
        .data
        .unwrap_or_else(|| PathBuf::from(&config.data.dir));
    let returns = load_panel_csv(&data_dir.join(&config.data.returns_file))
        .with_context(|| format!("loading return panel from {}", data_dir.display()))?;
    info!(
        rows = returns.n_rows(),
        assets = returns.n_cols(),
        "loaded return panel"
    );

    match cli.command {
        Commands::Run { strategy } => cmd_run(&config, &returns, &strategy),
        Commands::Walkforward { strategy, output } => {
            cmd_walkforward(&config, &returns, &strategy, &output)
        }
        Commands::Blend { output } => cmd_blend(&config, &returns, &output),
    }
}

fn sleeve_by_name(config: &AppConfig, name: &str) -> Result<SleeveSpec> {
    match name {
        "reversal" => Ok(config.reversal_sleeve()),
        "momentum" => Ok(config.momentum_sleeve()),
        other => bail!("unknown strategy: {other} (expected reversal or momentum)"),
    }
}

fn cmd_run(config: &AppConfig, returns: &Panel, strategy: &str) -> Result<()> {
    let sleeve = sleeve_by_name(config, strategy)?;
    let bars_per_year = config.walkforward.to_config().bars_per_year();
    let cost_rate = config.costs.cost_bps / 10_000.0;

    let weights = sleeve.strategy.weights(returns);
    let mask = rebalance_mask(returns.n_rows(), sleeve.every);
    let scheduled = apply_schedule(&weights, &mask);
    let result = backtest(&scheduled, returns, cost_rate, bars_per_year);

    let s = &result.summary;
    println!("Full-sample {strategy} backtest ({} bars)", returns.n_rows());
    println!("  ann return   gross {:>8.4}  net {:>8.4}", s.ann_ret_gross, s.ann_ret_net);
    println!("  ann vol      gross {:>8.4}  net {:>8.4}", s.ann_vol_gross, s.ann_vol_net);
    println!("  sharpe       gross {:>8.2}  net {:>8.2}", s.sharpe_gross, s.sharpe_net);
    println!("  turnover/bar {:>8.4}  cost/yr {:>8.4}", s.turnover_bar, s.cost_ann);
    println!("  max drawdown (net) {:>8.4}", max_drawdown(&result.net));

    if let Some(bench) = &config.data.benchmark {
        if returns.column_position(bench).is_some() {
            let bench_series = returns.column(bench)?;
            let ab = statarb_backtest::metrics::alpha_beta_hac(
                &result.net,
                &bench_series,
                24,
                bars_per_year,
            )?;
            println!(
                "  vs {bench}: alpha/yr {:.4} (t={:.2}), beta {:.3} (t={:.2}), R2 {:.3}",
                ab.alpha_ann, ab.alpha_t, ab.beta, ab.beta_t, ab.r_squared
            );
        }
    }
    Ok(())
}

fn cmd_walkforward(
    config: &AppConfig,
    returns: &Panel,
    strategy: &str,
    output: &PathBuf,
) -> Result<()> {
    let sleeve = sleeve_by_name(config, strategy)?;
    let wf_config = config.walkforward.to_config();
    let report = run_walk_forward(returns, &sleeve, config.costs.cost_bps, &wf_config)?;

    if report.folds.is_empty() {
        println!("No complete fold fits the available history; nothing to evaluate.");
        return Ok(());
    }

    println!(
        "{:>4} {:>12} {:>12} {:>9} {:>9} {:>8}",
        "fold", "test start", "test end", "ann ret", "ann vol", "sharpe"
    );
    for fold in &report.folds {
        println!(
            "{:>4} {:>12} {:>12} {:>9.4} {:>9.4} {:>8.2}",
            fold.fold,
            fold.test_start.format("%Y-%m-%d"),
            fold.test_end.format("%Y-%m-%d"),
            fold.test_ann_ret,
            fold.test_ann_vol,
            fold.test_sharpe
        );
    }

    let bars_per_year = wf_config.bars_per_year();
    let summary = perf_summary(&report.oos_net, "stitched OOS", bars_per_year);
    let hac = nw_mean_tstat(&report.oos_net, 24, bars_per_year);
    println!(
        "\nStitched OOS: ann ret {:.4}, ann vol {:.4}, sharpe {:.2}, max dd {:.4}, NW t {:.2}",
        summary.ann_ret, summary.ann_vol, summary.sharpe, summary.max_dd, hac.t_stat
    );

    std::fs::create_dir_all(output)?;
    write_fold_records_csv(&output.join(format!("wf_{strategy}_folds.csv")), &report.folds)?;
    write_series_csv(
        &output.join(format!("wf_{strategy}_oos_net.csv")),
        &report.oos_net,
        "net",
    )?;
    info!(output = %output.display(), "wrote walk-forward outputs");
    Ok(())
}

fn cmd_blend(config: &AppConfig, returns: &Panel, output: &PathBuf) -> Result<()> {
    let policy = config.blend.to_policy()?;
    let wf_config = config.walkforward.to_config();
    let report = run_walk_forward_blended(
        returns,
        &config.reversal_sleeve(),
        &config.momentum_sleeve(),
        &policy,
        config.costs.cost_bps,
        &wf_config,
    )?;

    if report.folds.is_empty() {
        println!("No complete fold fits the available history; nothing to evaluate.");
        return Ok(());
    }

    println!(
        "{:>4} {:>12} {:>12} {:>6} {:>6} {:>9} {:>8}",
        "fold", "test start", "test end", "w_rev", "w_mom", "ann ret", "sharpe"
    );
    for fold in &report.folds {
        println!(
            "{:>4} {:>12} {:>12} {:>6.3} {:>6.3} {:>9.4} {:>8.2}",
            fold.fold,
            fold.test_start.format("%Y-%m-%d"),
            fold.test_end.format("%Y-%m-%d"),
            fold.weight_a,
            fold.weight_b,
            fold.test_ann_ret,
            fold.test_sharpe
        );
    }

    let bars_per_year = wf_config.bars_per_year();
    let summary = perf_summary(&report.oos_net, "stitched OOS", bars_per_year);
    let hac = nw_mean_tstat(&report.oos_net, 24, bars_per_year);
    println!(
        "\nStitched OOS ({}): ann ret {:.4}, ann vol {:.4}, sharpe {:.2}, max dd {:.4}, NW t {:.2}",
        policy.name(),
        summary.ann_ret,
        summary.ann_vol,
        summary.sharpe,
        summary.max_dd,
        hac.t_stat
    );

    std::fs::create_dir_all(output)?;
    write_blend_records_csv(&output.join("blend_folds.csv"), &report.folds)?;
    write_series_csv(&output.join("blend_oos_net.csv"), &report.oos_net, "net")?;
    info!(output = %output.display(), "wrote blended walk-forward outputs");
    Ok(())
}
