//! Source adapter contracts, the six listing adapters, and type-tag dispatch.

use async_trait::async_trait;
use jobscout_core::{AdapterKind, RawPosting, SourceDescriptor};
use jobscout_storage::{FetchError, HttpFetcher};
use scraper::{ElementRef, Selector};
use serde_json::Value as JsonValue;
use thiserror::Error;

mod api;
mod ashby;
mod generic;
mod greenhouse;
mod lever;
mod nextjs;

pub use api::{parse_api_response, ApiAdapter};
pub use ashby::{extract_app_data, parse_ashby_page, AshbyAdapter, ASHBY_APP_DATA_MARKER};
pub use generic::{parse_generic_page, GenericAdapter};
pub use greenhouse::{
    greenhouse_feed_url, parse_greenhouse_feed, parse_greenhouse_html, GreenhouseAdapter,
};
pub use lever::{lever_json_url, parse_lever_html, parse_lever_json, LeverAdapter};
pub use nextjs::{parse_nextjs_page, NextJsAdapter, PLACEHOLDER_TITLE};

pub const CRATE_NAME: &str = "jobscout-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("{0}")]
    Message(String),
}

/// One extraction strategy for one source shape.
///
/// Adapters fetch their own documents because the fallback-capable ones decide which URL to read
/// next from what the first response looked like.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    async fn fetch_postings(
        &self,
        http: &HttpFetcher,
        source: &SourceDescriptor,
    ) -> Result<Vec<RawPosting>, AdapterError>;
}

pub fn adapter_for_kind(kind: AdapterKind) -> Box<dyn SourceAdapter> {
    match kind {
        AdapterKind::Generic => Box::new(GenericAdapter),
        AdapterKind::Greenhouse => Box::new(GreenhouseAdapter),
        AdapterKind::Lever => Box::new(LeverAdapter),
        AdapterKind::Ashby => Box::new(AshbyAdapter),
        AdapterKind::NextJs => Box::new(NextJsAdapter),
        AdapterKind::Api => Box::new(ApiAdapter),
    }
}

/// Adapter for the descriptor's declared type; unknown or missing types get the generic adapter.
pub fn adapter_for_source(source: &SourceDescriptor) -> Box<dyn SourceAdapter> {
    adapter_for_kind(source.adapter_kind())
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Concatenated element text, trimmed at both ends. Inner whitespace is kept as published.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Each text node trimmed, empty ones dropped, the rest joined without a separator.
pub(crate) fn stripped_fragments_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).filter(|t| !t.is_empty()).collect()
}

pub(crate) fn select_first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(element_text)
}

/// Resolves `href` against the page it was found on.
pub(crate) fn resolve_url(base: &str, href: &str) -> Result<String, AdapterError> {
    let href = href.trim();
    match url::Url::parse(base) {
        Ok(base) => base
            .join(href)
            .map(String::from)
            .map_err(|e| AdapterError::Message(format!("cannot resolve {href:?}: {e}"))),
        Err(_) => url::Url::parse(href)
            .map(String::from)
            .map_err(|e| AdapterError::Message(format!("cannot resolve {href:?} without a base: {e}"))),
    }
}

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

/// String or number at `path`, rendered as text.
pub(crate) fn json_text(value: &JsonValue, path: &[&str]) -> Option<String> {
    match json_at(value, path)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First key in `keys` holding non-empty text.
pub(crate) fn json_text_any(value: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| json_text(value, &[key]))
        .find(|s| !s.trim().is_empty())
}

pub(crate) fn json_bool(value: &JsonValue, path: &[&str]) -> Option<bool> {
    json_at(value, path)?.as_bool()
}

/// Tries each candidate path in order; the first one holding a non-empty array wins.
pub(crate) fn first_non_empty_array<'a>(
    value: &'a JsonValue,
    paths: &[&[&str]],
) -> Option<&'a [JsonValue]> {
    paths
        .iter()
        .filter_map(|path| json_at(value, path)?.as_array())
        .find(|items| !items.is_empty())
        .map(Vec::as_slice)
}
