//! Shared building blocks: errors, domain types, decimal helpers and the gateway trait

pub mod decimal;
pub mod errors;
pub mod traits;
pub mod types;
