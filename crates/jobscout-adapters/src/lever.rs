use async_trait::async_trait;
use jobscout_core::{AdapterKind, RawPosting, SourceDescriptor, MISSING_TITLE};
use jobscout_storage::HttpFetcher;
use scraper::Html;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::{
    json_text, parse_selector, resolve_url, stripped_fragments_text, AdapterError, SourceAdapter,
};

/// Lever boards: `?mode=json` output first, the hosted listing page otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeverAdapter;

#[async_trait]
impl SourceAdapter for LeverAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Lever
    }

    async fn fetch_postings(
        &self,
        http: &HttpFetcher,
        source: &SourceDescriptor,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        // Some deployments answer `?mode=json` with a 200 HTML page, so the body has to parse.
        let json = match http.fetch_text(&lever_json_url(&source.url), None).await {
            Ok(resp) => parse_lever_json(&resp.body),
            Err(err) => Err(AdapterError::from(err)),
        };
        match json {
            Ok(postings) => Ok(postings),
            Err(err) => {
                info!(source = %source.name, reason = %err, "lever json mode unavailable, reading listing html");
                let page = http
                    .fetch_text(source.url.trim_end_matches('/'), None)
                    .await?;
                parse_lever_html(source, &page.body)
            }
        }
    }
}

pub fn lever_json_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    match url::Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("mode", "json");
            url.into()
        }
        Err(_) => format!("{base}?mode=json"),
    }
}

pub fn parse_lever_json(body: &str) -> Result<Vec<RawPosting>, AdapterError> {
    let value: JsonValue = serde_json::from_str(body)?;
    let JsonValue::Array(records) = value else {
        return Err(AdapterError::Message("lever json mode did not return an array".into()));
    };

    Ok(records
        .iter()
        .filter_map(|record| {
            if !record.is_object() {
                debug!("skipping malformed lever posting");
                return None;
            }
            Some(RawPosting {
                title: json_text(record, &["text"]).unwrap_or_else(|| MISSING_TITLE.to_string()),
                location: json_text(record, &["categories", "location"]),
                description: json_text(record, &["description"]),
                url: json_text(record, &["hostedUrl"]).unwrap_or_default(),
                date_posted: json_text(record, &["createdAt"]),
                department: json_text(record, &["categories", "department"]),
                employment_type: json_text(record, &["categories", "commitment"]),
                ..Default::default()
            })
        })
        .collect())
}

pub fn parse_lever_html(
    source: &SourceDescriptor,
    html: &str,
) -> Result<Vec<RawPosting>, AdapterError> {
    let posting_sel = parse_selector("div.posting")?;
    let title_sel = parse_selector("h5")?;
    let link_sel = parse_selector("a[href]")?;
    let location_sel = parse_selector(".location")?;
    let department_sel = parse_selector(".department")?;
    let document = Html::parse_document(html);

    let mut postings = Vec::new();
    for posting in document.select(&posting_sel) {
        let href = posting
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();
        let url = if href.is_empty() {
            String::new()
        } else {
            match resolve_url(&source.url, href) {
                Ok(url) => url,
                Err(err) => {
                    debug!(source = %source.name, error = %err, "skipping lever posting");
                    continue;
                }
            }
        };
        postings.push(RawPosting {
            title: posting
                .select(&title_sel)
                .next()
                .map(stripped_fragments_text)
                .unwrap_or_else(|| MISSING_TITLE.to_string()),
            location: posting.select(&location_sel).next().map(stripped_fragments_text),
            department: posting.select(&department_sel).next().map(stripped_fragments_text),
            url,
            ..Default::default()
        });
    }
    Ok(postings)
}
