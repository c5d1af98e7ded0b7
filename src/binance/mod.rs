//! Binance module - signed REST gateway for account operations

pub mod auth;
pub mod messages;
pub mod rest;

pub use rest::BinanceRestClient;
