//! Routing configuration subsystem.
//!
//! # Data Flow
//! ```text
//! RouteStore (enabled rows)
//!     → translator.rs (rows → descriptors, bad rows skipped)
//!     → snapshot.rs (link routes to clusters, sort, fresh change signal)
//!     → provider.rs (atomic swap, then fire the previous signal)
//!
//! Consumers:
//!     provider.current()      → Arc<ConfigSnapshot>, lock-free
//!     provider.change_token() → await the next publish
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable and replaced wholesale
//! - Deterministic: same rows always produce the same ordered routes
//! - First match wins (ordered by `order`, then `route_id`)
//! - Matching itself belongs to the traffic engine, not to this crate

pub mod descriptor;
pub mod provider;
pub mod snapshot;
pub mod translator;

pub use descriptor::{ClusterDescriptor, RouteDescriptor};
pub use provider::{ReloadError, ReloadOutcome, SnapshotProvider};
pub use snapshot::{ChangeSignal, ChangeToken, ConfigSnapshot};
pub use translator::{ConfigTranslator, TranslateError, TranslatedConfig};
