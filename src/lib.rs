//! Swapdesk - DEX trade orchestration and transaction lifecycle tracking

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod math;
pub mod shared;

// Re-export main types for convenience
pub use domain::quote::QuoteEngine;
pub use domain::trade::TradeOrchestrator;
pub use domain::transactions::{TransactionRegistry, TransactionTracker};
