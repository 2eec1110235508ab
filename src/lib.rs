// MarketStud client - authenticated API access with transparent token refresh

pub mod auth;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod transport;

pub use client::MarketClient;
pub use error::ApiError;
