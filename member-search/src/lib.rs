pub mod api;
pub mod config;
pub mod embedding;
pub mod members;
pub mod metrics_consts;
pub mod router;
pub mod search;
pub mod server;
pub mod state;
pub mod storage;
pub mod utils;
