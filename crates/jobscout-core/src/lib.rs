//! Core domain model for jobscout: source descriptors, raw adapter output and canonical postings.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const CRATE_NAME: &str = "jobscout-core";

/// Maximum number of characters kept from a posting description.
pub const DESCRIPTION_LIMIT: usize = 500;

/// Title stored when an adapter could not locate one.
pub const MISSING_TITLE: &str = "No title";

/// Closed set of extraction strategies a source descriptor can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Generic,
    Greenhouse,
    Lever,
    Ashby,
    NextJs,
    Api,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 6] = [
        AdapterKind::Generic,
        AdapterKind::Greenhouse,
        AdapterKind::Lever,
        AdapterKind::Ashby,
        AdapterKind::NextJs,
        AdapterKind::Api,
    ];

    /// Resolves a declared type tag. Unknown or missing tags resolve to `Generic`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag else {
            return AdapterKind::Generic;
        };
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(tag))
            .unwrap_or(AdapterKind::Generic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Generic => "generic",
            AdapterKind::Greenhouse => "greenhouse",
            AdapterKind::Lever => "lever",
            AdapterKind::Ashby => "ashby",
            AdapterKind::NextJs => "nextjs",
            AdapterKind::Api => "api",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

fn unknown_source_name() -> String {
    "Unknown".to_string()
}

/// Configuration record identifying one external job feed and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default = "unknown_source_name")]
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    /// Field name -> CSS selector, read by the generic adapter only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<BTreeMap<String, String>>,
    /// Extra request headers, read by the api adapter only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: AdapterKind) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: Some(kind.as_str().to_string()),
            enabled: true,
            selectors: None,
            headers: None,
        }
    }

    pub fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::from_tag(self.kind.as_deref())
    }

    /// Configured selector for `field`, ignoring blank entries.
    pub fn selector(&self, field: &str) -> Option<&str> {
        self.selectors
            .as_ref()
            .and_then(|s| s.get(field))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// Fields pulled out of one external document by an adapter, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosting {
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub date_posted: Option<String>,
    pub department: Option<String>,
    pub employment_type: Option<String>,
}

impl RawPosting {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Canonical posting shared across all adapters and persisted in the collection.
///
/// Text fields deserialize leniently so collections written by older tooling still load:
/// numbers and booleans become their string form, objects and arrays are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub company: String,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub date_posted: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_text")]
    pub employment_type: Option<String>,
    /// Display name of the descriptor the posting was scraped from.
    #[serde(default, deserialize_with = "lenient_text")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub scraped_at: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseText {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Other(serde::de::IgnoredAny),
}

impl LooseText {
    fn into_text(self) -> Option<String> {
        match self {
            LooseText::Text(s) => Some(s),
            LooseText::Int(n) => Some(n.to_string()),
            LooseText::UInt(n) => Some(n.to_string()),
            LooseText::Float(n) => Some(n.to_string()),
            LooseText::Bool(b) => Some(b.to_string()),
            LooseText::Other(serde::de::IgnoredAny) => None,
        }
    }
}

fn lenient_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<LooseText>::deserialize(deserializer)?.and_then(LooseText::into_text))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_text(deserializer)?.unwrap_or_default())
}

impl JobPosting {
    pub fn scraped_at_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.scraped_at)
    }
}

/// Stable identity over `(title, company, url)`.
///
/// MD5 of the plain concatenation, hex encoded. Fast and deterministic across runs; not
/// collision resistant.
pub fn posting_id(title: &str, company: &str, url: &str) -> String {
    let mut input = String::with_capacity(title.len() + company.len() + url.len());
    input.push_str(title);
    input.push_str(company);
    input.push_str(url);
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Parses an RFC 3339 timestamp, or a naive ISO-8601 one interpreted as local time.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn clean_text(value: &str) -> String {
    value.trim().to_string()
}

pub fn text_or_none(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Keeps at most `limit` characters, never splitting a code point.
pub fn truncate_chars(value: &str, limit: usize) -> &str {
    match value.char_indices().nth(limit) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Turns adapter output into canonical postings stamped with one scrape time.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    scraped_at: DateTime<Utc>,
}

impl Normalizer {
    pub fn new(scraped_at: DateTime<Utc>) -> Self {
        Self { scraped_at }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn scraped_at(&self) -> DateTime<Utc> {
        self.scraped_at
    }

    pub fn normalize(&self, source: &SourceDescriptor, raw: RawPosting) -> JobPosting {
        let title = match clean_text(&raw.title) {
            t if t.is_empty() => MISSING_TITLE.to_string(),
            t => t,
        };
        let company = text_or_none(raw.company).unwrap_or_else(|| clean_text(&source.name));
        let url = clean_text(&raw.url);
        let description = text_or_none(raw.description)
            .map(|d| truncate_chars(&d, DESCRIPTION_LIMIT).trim_end().to_string())
            .filter(|d| !d.is_empty());

        JobPosting {
            id: posting_id(&title, &company, &url),
            title,
            company,
            location: text_or_none(raw.location),
            description,
            url,
            date_posted: text_or_none(raw.date_posted),
            department: text_or_none(raw.department),
            employment_type: text_or_none(raw.employment_type),
            source: clean_text(&source.name),
            scraped_at: self.scraped_at.to_rfc3339(),
        }
    }

    pub fn normalize_all(&self, source: &SourceDescriptor, raw: Vec<RawPosting>) -> Vec<JobPosting> {
        raw.into_iter().map(|r| self.normalize(source, r)).collect()
    }
}
