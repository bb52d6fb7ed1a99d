use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;

use super::types::RawArticle;
use crate::storage::{Article, ArticleSource};

/// Placeholder used when the endpoint ships no description
pub const DEFAULT_DESCRIPTION: &str = "No description available";
/// Source name used when the endpoint ships none
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Result of normalizing one page of wire articles.
#[derive(Debug, Default)]
pub struct NormalizeResult {
    pub articles: Vec<Article>,
    /// Count of wire articles dropped as malformed or duplicate
    pub skipped: usize,
}

/// Map wire articles into [`Article`]s.
///
/// Articles missing an id, title, link or a parseable publication date are
/// dropped. Later duplicates of an id already seen in this page are dropped.
pub fn normalize_articles(raw: Vec<RawArticle>) -> NormalizeResult {
    let total = raw.len();
    let mut seen = HashSet::with_capacity(total);
    let articles: Vec<Article> = raw
        .into_iter()
        .filter_map(normalize_article)
        .filter(|a| seen.insert(a.id.clone()))
        .collect();

    NormalizeResult {
        skipped: total - articles.len(),
        articles,
    }
}

/// Map a single wire article, or `None` if a required field is missing.
pub fn normalize_article(raw: RawArticle) -> Option<Article> {
    let id = non_empty(raw.article_id)?;
    let title = non_empty(raw.title)?;
    let url = non_empty(raw.link)?;
    let published_at = raw.pub_date.as_deref().and_then(parse_pub_date)?;

    Some(Article {
        id,
        title,
        description: Some(
            non_empty(raw.description).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        ),
        content: non_empty(raw.content),
        author: raw
            .creator
            .and_then(|creators| creators.into_iter().find(|c| !c.trim().is_empty())),
        url,
        image_url: non_empty(raw.image_url),
        video_url: non_empty(raw.video_url),
        published_at,
        source: ArticleSource {
            id: non_empty(raw.source_id),
            name: non_empty(raw.source_name).unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        },
        keywords: raw.keywords.unwrap_or_default(),
        countries: raw.country.unwrap_or_default(),
        categories: raw.category.unwrap_or_default(),
        language: non_empty(raw.language),
    })
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` (interpreted as UTC).
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn raw(id: &str) -> RawArticle {
        RawArticle {
            article_id: Some(id.to_string()),
            title: Some(format!("Title {id}")),
            link: Some(format!("https://example.com/{id}")),
            pub_date: Some("2024-05-01 08:30:00".to_string()),
            ..RawArticle::default()
        }
    }

    #[test]
    fn test_defaults_are_filled() {
        let article = normalize_article(raw("a")).unwrap();
        assert_eq!(article.description.as_deref(), Some(DEFAULT_DESCRIPTION));
        assert_eq!(article.source.name, UNKNOWN_SOURCE);
        assert!(article.image_url.is_none());
        assert_eq!(
            article.published_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_fields_are_renamed() {
        let mut r = raw("a");
        r.image_url = Some("https://img.example.com/a.png".into());
        r.source_id = Some("bbc".into());
        r.source_name = Some("BBC".into());
        r.creator = Some(vec!["".into(), "Jane Doe".into()]);
        r.category = Some(vec!["technology".into()]);
        r.country = Some(vec!["united kingdom".into()]);

        let article = normalize_article(r).unwrap();
        assert_eq!(article.url, "https://example.com/a");
        assert_eq!(
            article.image_url.as_deref(),
            Some("https://img.example.com/a.png")
        );
        assert_eq!(article.source.id.as_deref(), Some("bbc"));
        assert_eq!(article.source.name, "BBC");
        assert_eq!(article.author.as_deref(), Some("Jane Doe"));
        assert_eq!(article.categories, vec!["technology".to_string()]);
        assert_eq!(article.countries, vec!["united kingdom".to_string()]);
    }

    #[test]
    fn test_missing_required_fields_are_dropped() {
        let mut no_id = raw("a");
        no_id.article_id = None;
        let mut blank_title = raw("b");
        blank_title.title = Some("   ".into());
        let mut no_link = raw("c");
        no_link.link = None;
        let mut bad_date = raw("d");
        bad_date.pub_date = Some("yesterday".into());

        let result = normalize_articles(vec![no_id, blank_title, no_link, bad_date, raw("ok")]);
        assert_eq!(result.skipped, 4);
        assert_eq!(result.articles.len(), 1);
        assert_eq!(result.articles[0].id, "ok");
    }

    #[test]
    fn test_duplicate_ids_in_page_keep_first() {
        let mut second = raw("a");
        second.title = Some("Second".into());
        let result = normalize_articles(vec![raw("a"), second, raw("b")]);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.articles[0].title, "Title a");
        assert_eq!(result.articles[1].id, "b");
    }

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_pub_date("2024-05-01T08:30:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap());
        assert!(parse_pub_date("").is_none());
    }
}
