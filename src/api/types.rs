use serde::{Deserialize, Serialize};

/// Smallest page size the endpoint accepts
pub const MIN_PAGE_SIZE: u32 = 1;
/// Largest page size the endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 100;
/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Filters and cursor for one `GET /news` request.
///
/// `page: None` requests the first page. Empty filter strings are treated
/// as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewsQuery {
    pub query: Option<String>,
    pub country: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub page: Option<String>,
    pub size: Option<u32>,
}

impl NewsQuery {
    pub fn with_page(mut self, page: Option<String>) -> Self {
        self.page = page;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Effective page size, clamped to the endpoint's accepted range.
    pub fn page_size(&self) -> u32 {
        self.size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    /// Query-string pairs in endpoint naming, without the API key.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(6);
        let filters = [
            ("q", &self.query),
            ("country", &self.country),
            ("category", &self.category),
            ("language", &self.language),
            ("page", &self.page),
        ];
        for (name, value) in filters {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((name, v.to_string()));
            }
        }
        pairs.push(("size", self.page_size().to_string()));
        pairs
    }

    /// Stable key for caching responses to this exact query.
    pub fn cache_key(&self) -> String {
        let encoded: Vec<String> = self
            .to_pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("news?{}", encoded.join("&"))
    }
}

/// Response body of `GET /news`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub results: Vec<RawArticle>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Article exactly as the endpoint ships it. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArticle {
    pub article_id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "pubDate")]
    pub pub_date: Option<String>,
    pub image_url: Option<String>,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub source_icon: Option<String>,
    pub source_priority: Option<i64>,
    pub creator: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub video_url: Option<String>,
    pub country: Option<Vec<String>>,
    pub category: Option<Vec<String>>,
    pub language: Option<String>,
}

/// Body the endpoint sends with a non-2xx status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
