//! Device state registry
//!
//! The registry holds the canonical live state of every configured device and
//! fans each change out to consumers. It uses `tokio::sync::broadcast` so that
//! any number of consumers can follow updates without the writer waiting on
//! them.
//!
//! # Architecture
//!
//! ```text
//!                         StateStore (single owner)
//!                    ┌──────────────────────────────┐
//!                    │ states: [DeviceState; N]     │
//!                    │ resolver, classifier         │
//!                    │ broadcaster: broadcast::Tx   │
//!                    └──────────────┬───────────────┘
//!                                   │ merge()
//!         ┌─────────────────────────┼─────────────────────────┐
//!         ▼                         ▼                         ▼
//!   [Subscription]            [Subscription]            [Subscription]
//!   snapshot + recv()         snapshot + recv()         snapshot + recv()
//! ```

pub mod broadcast;
pub mod entry;
pub mod error;
pub mod store;

pub use broadcast::{Broadcaster, Subscription, DEFAULT_BROADCAST_CAPACITY};
pub use entry::{AmsSlot, ConnectionStatus, DeviceState, StateUpdate};
pub use error::RegistryError;
pub use store::StateStore;
