pub mod batch;
pub mod buffer;
pub mod catalog;
pub mod columnar;
pub mod config;
pub mod discovery;
pub mod event;
pub mod event_store;
pub mod fake_feed;
pub mod features;
pub mod http_cache;
pub mod http_client;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod stats_export;
