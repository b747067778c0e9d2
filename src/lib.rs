pub mod analysis;
pub mod config;
pub mod data_source;
pub mod export;
pub mod features;
pub mod feed;
pub mod forest;
pub mod http_cache;
pub mod http_client;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod predictor;
pub mod records;
pub mod state;
pub mod store;
