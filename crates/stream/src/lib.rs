pub mod backoff;
pub mod book;
pub mod client;
pub mod queue;
mod wire;

pub use backoff::Backoff;
pub use book::OrderBookState;
pub use client::{MarketStream, StreamError, StreamHandle};
pub use queue::BoundedQueue;
