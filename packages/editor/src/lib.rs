//! # Renscript Editor Core
//!
//! Real-time collaboration engine for script editing sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ transport: WebSocket text frames (JSON)     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ engine: CollabEngine                        │
//! │  - session registry (projects / scripts)    │
//! │  - per-node advisory locks with expiry      │
//! │  - broadcast fan-out with exclusions        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ peers: queued events per connection         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **One engine per server**: constructed at startup and injected into
//!    handlers, never a process-wide singleton
//! 2. **One lock around all state**: each inbound message mutates state and
//!    enqueues its broadcasts atomically with respect to other messages
//! 3. **Advisory node locks**: exclusivity at tree-node granularity; content
//!    convergence is the storage layer's last-write-wins concern
//! 4. **Absorb transport errors**: a dead peer never fails the sender

pub mod broadcast;
pub mod connection;
pub mod engine;
pub mod locks;
pub mod protocol;
pub mod sessions;

#[cfg(test)]
mod tests_comprehensive;

pub use connection::ConnectionHandle;
pub use engine::CollabEngine;
pub use locks::{LockEntry, LockManager, DEFAULT_LOCK_TIMEOUT_SECS};
pub use protocol::{ActiveUser, ClientMessage, LockInfo, ServerEvent};
pub use sessions::{Session, SessionRegistry};
