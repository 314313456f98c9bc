use async_trait::async_trait;
use jobscout_core::{AdapterKind, RawPosting, SourceDescriptor, MISSING_TITLE};
use jobscout_storage::HttpFetcher;
use scraper::Html;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::{
    first_non_empty_array, json_bool, json_text, parse_selector, resolve_url, AdapterError,
    SourceAdapter,
};

/// Global the Ashby job board assigns its bootstrap state to.
pub const ASHBY_APP_DATA_MARKER: &str = "window.__appData";

const POSTING_PATHS: &[&[&str]] = &[
    &["jobPostings"],
    &["jobBoard", "jobPostings"],
    &["jobBoard", "jobs"],
];

/// Ashby-hosted boards, read from the state object inlined into the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct AshbyAdapter;

#[async_trait]
impl SourceAdapter for AshbyAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Ashby
    }

    async fn fetch_postings(
        &self,
        http: &HttpFetcher,
        source: &SourceDescriptor,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let page = http.fetch_text(&source.url, None).await?;
        parse_ashby_page(source, &page.body)
    }
}

/// Parses the object literal assigned to the app-data global inside one script body.
///
/// Reads exactly one JSON value after the `=` and ignores whatever follows it, so nested braces
/// and trailing statements are fine.
pub fn extract_app_data(script: &str) -> Option<JsonValue> {
    let start = script.find(ASHBY_APP_DATA_MARKER)? + ASHBY_APP_DATA_MARKER.len();
    let rest = script[start..].trim_start().strip_prefix('=')?.trim_start();
    if !rest.starts_with('{') {
        return None;
    }
    let mut de = serde_json::Deserializer::from_str(rest);
    JsonValue::deserialize(&mut de).ok()
}

pub fn parse_ashby_page(
    source: &SourceDescriptor,
    html: &str,
) -> Result<Vec<RawPosting>, AdapterError> {
    let scripts = parse_selector("script")?;
    let document = Html::parse_document(html);

    let app_data = document
        .select(&scripts)
        .map(|script| script.text().collect::<String>())
        .filter(|body| body.contains(ASHBY_APP_DATA_MARKER))
        .find_map(|body| extract_app_data(&body));

    let Some(app_data) = app_data else {
        info!(source = %source.name, "no ashby app data found on page");
        return Ok(Vec::new());
    };
    let Some(postings) = first_non_empty_array(&app_data, POSTING_PATHS) else {
        info!(source = %source.name, "ashby app data has no job postings");
        return Ok(Vec::new());
    };

    let mut listed = Vec::new();
    for posting in postings.iter().filter(|p| p.is_object()) {
        if !json_bool(posting, &["isListed"]).unwrap_or(true) {
            debug!(source = %source.name, "skipping unlisted ashby posting");
            continue;
        }
        // Posting pages hang off the board host, not the board path.
        let id = json_text(posting, &["id"]).unwrap_or_default();
        let url = match resolve_url(&source.url, &format!("/{id}")) {
            Ok(url) => url,
            Err(err) => {
                debug!(source = %source.name, error = %err, "skipping ashby posting");
                continue;
            }
        };
        listed.push(RawPosting {
            title: json_text(posting, &["title"]).unwrap_or_else(|| MISSING_TITLE.to_string()),
            location: json_text(posting, &["locationName"]),
            description: json_text(posting, &["descriptionPlain"]),
            url,
            date_posted: json_text(posting, &["publishedDate"]),
            employment_type: json_text(posting, &["employmentType"]),
            department: json_text(posting, &["departmentName"]),
            ..Default::default()
        });
    }
    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("Acme", "https://jobs.ashbyhq.com/acme", AdapterKind::Ashby)
    }

    fn page(script: &str) -> String {
        format!(
            "<html><head><script>var analytics = {{}};</script><script>{script}</script></head><body></body></html>"
        )
    }

    #[test]
    fn extracts_nested_object_and_ignores_trailing_code() {
        let script = r#"window.__appData = {"a":{"b":{"c":"}"}},"jobPostings":[]}; window.__other = {};"#;
        let value = extract_app_data(script).unwrap();
        assert_eq!(value["a"]["b"]["c"], "}");
        assert!(extract_app_data("window.__appData = null;").is_none());
        assert!(extract_app_data("console.log(1)").is_none());
    }

    #[test]
    fn top_level_postings_are_mapped_and_unlisted_ones_dropped() {
        let html = page(
            r#"window.__appData = {"jobPostings":[
                {"id":"abc-123","title":"Product Engineer","locationName":"Remote","descriptionPlain":"Ship it",
                 "publishedDate":"2026-02-01","employmentType":"FullTime","departmentName":"Engineering","isListed":true},
                {"id":"hidden","title":"Secret Role","isListed":false},
                {"id":"def-456","title":"Support Lead"}
            ]};"#,
        );
        let postings = parse_ashby_page(&source(), &html).unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(
            postings[0],
            RawPosting {
                title: "Product Engineer".into(),
                location: Some("Remote".into()),
                description: Some("Ship it".into()),
                url: "https://jobs.ashbyhq.com/abc-123".into(),
                date_posted: Some("2026-02-01".into()),
                employment_type: Some("FullTime".into()),
                department: Some("Engineering".into()),
                ..Default::default()
            }
        );
        assert_eq!(postings[1].title, "Support Lead");
        assert_eq!(postings[1].url, "https://jobs.ashbyhq.com/def-456");
    }

    #[test]
    fn posting_urls_are_rooted_at_the_board_host() {
        let nested = SourceDescriptor::new(
            "Acme",
            "https://careers.acme.example/boards/acme/",
            AdapterKind::Ashby,
        );
        let html = page(r#"window.__appData = {"jobPostings":[{"id":"xyz","title":"Analyst"}]};"#);
        let postings = parse_ashby_page(&nested, &html).unwrap();
        assert_eq!(postings[0].url, "https://careers.acme.example/xyz");
    }

    #[test]
    fn nested_job_board_aliases_are_searched() {
        let html = page(r#"window.__appData = {"jobBoard":{"jobs":[{"id":"1","title":"Analyst"}]}};"#);
        let postings = parse_ashby_page(&source(), &html).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].title, "Analyst");

        let html = page(r#"window.__appData = {"jobPostings":[],"jobBoard":{"jobPostings":[{"id":"2","title":"Writer"}]}};"#);
        let postings = parse_ashby_page(&source(), &html).unwrap();
        assert_eq!(postings[0].title, "Writer");
    }

    #[test]
    fn missing_marker_or_postings_yield_nothing() {
        assert!(parse_ashby_page(&source(), &page("var x = 1;")).unwrap().is_empty());
        assert!(parse_ashby_page(&source(), &page(r#"window.__appData = {"organization":{}};"#))
            .unwrap()
            .is_empty());
    }
}
