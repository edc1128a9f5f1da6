pub mod backtest;
pub mod export_snapshot;
pub mod signals;
pub mod trade;
