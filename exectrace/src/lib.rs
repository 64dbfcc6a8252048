pub mod config;
pub mod correlate;
pub mod dataset;
pub mod events;
pub mod filter;
pub mod output;
pub mod snapshot;
pub mod trace;
pub mod util;
