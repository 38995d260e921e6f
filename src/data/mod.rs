pub mod binance;
pub mod loader;
pub mod types;

pub use binance::{build_panels, interval_duration, BinanceClient, BinanceError, Kline};
pub use loader::{
    load_panel_csv, load_panels, write_blend_records_csv, write_fold_records_csv, write_panel_csv,
    write_series_csv, LoaderError,
};
pub use types::{Panel, PanelError, TimeSeries};
