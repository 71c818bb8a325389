//! # ruleforge-sync
//!
//! Conflict resolution, overlays, the atomic writer, the drift guard and
//! the sync pipeline that ties them to the exporters.
//!
//! Call [`pipeline::sync`] with a [`SyncContext`] to run everything; the
//! other modules are usable on their own.

pub mod checksums;
pub mod conflict;
pub mod diff;
pub mod error;
pub mod export;
pub mod lockfile;
pub mod overlay;
pub mod pipeline;
pub mod staleness;
pub mod writer;

pub use checksums::{ChecksumRecord, ChecksumStore, RecordKind};
pub use conflict::{ConflictRecord, SourceFile};
pub use error::SyncError;
pub use export::{ExportResult, ExportSession};
pub use lockfile::{AllowList, DriftStatus, Lockfile};
pub use overlay::{OverlayOutcome, OverlayReport};
pub use pipeline::{check, sync, CheckReport, SyncContext, SyncOptions, SyncOutcome};
pub use writer::{AtomicWriter, ChecksumHandler, ManualEdit, Resolution, WriteOptions, WriteOutcome};
