/// Live document query module
///
/// This module turns the raw change batches reported by a document source
/// into sorted result sets plus the edits that produced them:
/// - `edit.rs` - the edit vocabulary and its canonical order
/// - `filter.rs` - the extension allow-list
/// - `reconcile.rs` - the pure reconciliation function
/// - `local.rs` - the local directory fallback source
/// - `engine.rs` - the serial worker that owns the previous snapshot

pub mod edit;
pub mod engine;
pub mod filter;
pub mod local;
pub mod reconcile;

pub use edit::EditOperation;
pub use engine::{EngineConfig, QueryEngine, QueryUpdate, SourceMode};
pub use filter::{AllowList, ExtensionFilter};
pub use reconcile::{reconcile, ChangeBatch, Changes, DiffPolicy, Reconciliation};
