pub mod aggregate;
pub mod anti_tilt;
pub mod api;
pub mod config;
pub mod http_cache;
pub mod http_client;
pub mod identity;
pub mod local_store;
pub mod model;
pub mod page;
pub mod refresh;
pub mod state;
