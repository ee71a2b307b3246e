//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build store + cache + provider → first reload → background tasks
//!     → admin listener
//!
//! Reload triggers (startup.rs reload loop):
//!     store watcher / SIGHUP → debounce → provider.reload()
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → broadcast → admin drains, tasks exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Every background task selects on the shutdown broadcast

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Gateway, StartupError};
