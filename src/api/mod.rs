//! Remote news endpoint access.
//!
//! - [`types`] - wire shapes of `GET /news` and the [`NewsQuery`] filter set
//! - [`client`] - the [`NewsSource`] seam and its reqwest implementation
//! - [`normalize`] - mapping wire articles into [`Article`](crate::storage::Article)

mod client;
mod normalize;
mod types;

pub use client::{FetchError, NewsClient, NewsSource};
pub use normalize::{
    normalize_article, normalize_articles, parse_pub_date, NormalizeResult, DEFAULT_DESCRIPTION,
    UNKNOWN_SOURCE,
};
pub use types::{
    ApiErrorBody, NewsQuery, NewsResponse, RawArticle, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};

#[cfg(test)]
pub(crate) use types::fixtures;
