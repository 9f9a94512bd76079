//! Adapters for the chain, the order book, storage and notifications

pub mod json_rpc_provider;
pub mod notifications;
pub mod order_book_client;
pub mod receipt_watcher;
pub mod storage;

pub use json_rpc_provider::JsonRpcProvider;
pub use notifications::{ChannelNotifier, TracingNotifier};
pub use order_book_client::OrderBookClient;
pub use receipt_watcher::ReceiptWatcher;
pub use storage::{JsonFileStore, MemoryStore, Persistence};
