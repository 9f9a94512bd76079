//! Domain layer - core business logic and entities

pub mod quote;
pub mod trade;
pub mod transactions;
