//! Feed synchronization: the [`NewsSyncEngine`] and the types it reports
//! through.
//!
//! - [`engine`] - load/refresh/paginate with retry, timeout and cache fallback
//! - [`error`] - the [`SyncError`] taxonomy and retry policy
//! - [`loading`] - mutually exclusive loading flags
//! - [`notice`] - user-facing messages

mod engine;
mod error;
mod loading;
mod notice;

pub use engine::{EngineBuilder, LoadOutcome, LoaderState, NewsSyncEngine};
pub use error::SyncError;
pub use loading::{LoadingKind, LoadingState};
pub use notice::Notice;
