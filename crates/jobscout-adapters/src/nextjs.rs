use async_trait::async_trait;
use jobscout_core::{AdapterKind, RawPosting, SourceDescriptor, MISSING_TITLE};
use jobscout_storage::HttpFetcher;
use scraper::Html;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::{
    first_non_empty_array, json_bool, json_text, parse_selector, resolve_url, AdapterError,
    SourceAdapter,
};

/// Seed entry some boards keep in their listing; compared case-insensitively.
pub const PLACEHOLDER_TITLE: &str = "dummy job";

const NEXT_DATA_SELECTOR: &str = "script#__NEXT_DATA__";
const LISTING_PATHS: &[&[&str]] = &[&["props", "pageProps", "list"], &["props", "pageProps", "jobs"]];

/// Next.js career sites, read from the `__NEXT_DATA__` page props.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextJsAdapter;

#[async_trait]
impl SourceAdapter for NextJsAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::NextJs
    }

    async fn fetch_postings(
        &self,
        http: &HttpFetcher,
        source: &SourceDescriptor,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let page = http.fetch_text(&source.url, None).await?;
        parse_nextjs_page(source, &page.body)
    }
}

pub fn parse_nextjs_page(
    source: &SourceDescriptor,
    html: &str,
) -> Result<Vec<RawPosting>, AdapterError> {
    let selector = parse_selector(NEXT_DATA_SELECTOR)?;
    let document = Html::parse_document(html);
    let Some(script) = document.select(&selector).next() else {
        info!(source = %source.name, "no __NEXT_DATA__ script on page");
        return Ok(Vec::new());
    };
    let data: JsonValue = serde_json::from_str(&script.text().collect::<String>())?;
    let Some(entries) = first_non_empty_array(&data, LISTING_PATHS) else {
        return Ok(Vec::new());
    };

    let mut postings = Vec::new();
    for entry in entries.iter().filter(|e| is_active_listing(e)) {
        let id = json_text(entry, &["id"]).unwrap_or_default();
        let url = match resolve_url(&source.url, &format!("/positions/{id}")) {
            Ok(url) => url,
            Err(err) => {
                debug!(source = %source.name, error = %err, "skipping next.js listing");
                continue;
            }
        };
        postings.push(RawPosting {
            title: json_text(entry, &["jobTitle"]).unwrap_or_else(|| MISSING_TITLE.to_string()),
            location: entry
                .get("officeLocations")
                .and_then(JsonValue::as_array)
                .and_then(|offices| offices.first())
                .and_then(|office| json_text(office, &["title"])),
            description: json_text(entry, &["description"]),
            url,
            ..Default::default()
        });
    }
    Ok(postings)
}

/// Placeholder titles, explicitly hidden entries and anything not `"active"` are dropped, in
/// that order.
fn is_active_listing(entry: &JsonValue) -> bool {
    if !entry.is_object() {
        return false;
    }
    let title = json_text(entry, &["jobTitle"]).unwrap_or_default();
    if title.trim().eq_ignore_ascii_case(PLACEHOLDER_TITLE) {
        return false;
    }
    if json_bool(entry, &["visible"]) == Some(false) {
        return false;
    }
    entry.get("status").and_then(JsonValue::as_str) == Some("active")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("Acme", "https://careers.acme.example/jobs", AdapterKind::NextJs)
    }

    fn page(data: &JsonValue) -> String {
        format!(
            r#"<html><body><div id="__next"></div><script id="__NEXT_DATA__" type="application/json">{data}</script></body></html>"#
        )
    }

    #[test]
    fn active_entries_are_mapped_with_first_office() {
        let data = json!({"props":{"pageProps":{"list":[
            {"id":17,"jobTitle":"Mechanic","status":"active","visible":true,
             "officeLocations":[{"title":"Oslo"},{"title":"Bergen"}],"description":"Fix things"},
            {"id":18,"jobTitle":"Driver","status":"active","officeLocations":[]}
        ]}}});
        let postings = parse_nextjs_page(&source(), &page(&data)).unwrap();
        assert_eq!(
            postings,
            vec![
                RawPosting {
                    title: "Mechanic".into(),
                    location: Some("Oslo".into()),
                    description: Some("Fix things".into()),
                    url: "https://careers.acme.example/positions/17".into(),
                    ..Default::default()
                },
                RawPosting::new("Driver", "https://careers.acme.example/positions/18"),
            ]
        );
    }

    #[test]
    fn placeholder_hidden_and_inactive_entries_are_filtered() {
        let data = json!({"props":{"pageProps":{"jobs":[
            {"id":1,"jobTitle":"Dummy Job","status":"active"},
            {"id":2,"jobTitle":"Hidden","status":"active","visible":false},
            {"id":3,"jobTitle":"Closed","status":"archived"},
            {"id":4,"jobTitle":"No Status"},
            {"id":5,"jobTitle":"Kept","status":"active"},
            {"id":6,"jobTitle":"Shouting","status":"ACTIVE"}
        ]}}});
        let postings = parse_nextjs_page(&source(), &page(&data)).unwrap();
        let titles: Vec<_> = postings.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Kept"]);
    }

    #[test]
    fn missing_script_yields_nothing_and_bad_json_is_an_error() {
        assert!(parse_nextjs_page(&source(), "<html><body></body></html>").unwrap().is_empty());
        let broken = r#"<script id="__NEXT_DATA__" type="application/json">{"props":</script>"#;
        assert!(matches!(parse_nextjs_page(&source(), broken), Err(AdapterError::Json(_))));
    }
}
