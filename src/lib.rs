//! Offline-tolerant news feed client.
//!
//! The [`sync::NewsSyncEngine`] fetches a paginated feed through an
//! [`api::NewsSource`], merges pages into a shared [`store::ArticleStore`] and
//! falls back to the [`storage::PersistentCache`] snapshot when the network
//! can't be used.

pub mod api;
pub mod config;
pub mod favorites;
pub mod network;
pub mod repository;
pub mod storage;
pub mod store;
pub mod sync;
