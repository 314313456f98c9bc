use async_trait::async_trait;
use jobscout_core::{AdapterKind, RawPosting, SourceDescriptor, MISSING_TITLE};
use jobscout_storage::HttpFetcher;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{json_text, json_text_any, AdapterError, SourceAdapter};

/// Ad-hoc JSON endpoints returning a job array, optionally wrapped in `{ "jobs": [...] }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiAdapter;

#[async_trait]
impl SourceAdapter for ApiAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Api
    }

    async fn fetch_postings(
        &self,
        http: &HttpFetcher,
        source: &SourceDescriptor,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let resp = http.fetch_text(&source.url, source.headers.as_ref()).await?;
        parse_api_response(&resp.body)
    }
}

pub fn parse_api_response(body: &str) -> Result<Vec<RawPosting>, AdapterError> {
    let value: JsonValue = serde_json::from_str(body)?;
    let entries: &[JsonValue] = match &value {
        JsonValue::Array(entries) => entries.as_slice(),
        JsonValue::Object(map) => match map.get("jobs") {
            Some(JsonValue::Array(entries)) => entries.as_slice(),
            _ => &[],
        },
        _ => return Err(AdapterError::Message("api response is neither an array nor an object".into())),
    };

    Ok(entries
        .iter()
        .filter_map(|entry| {
            if !entry.is_object() {
                debug!("skipping malformed api job entry");
                return None;
            }
            Some(RawPosting {
                title: json_text(entry, &["title"]).unwrap_or_else(|| MISSING_TITLE.to_string()),
                company: json_text(entry, &["company"]),
                location: json_text(entry, &["location"]),
                description: json_text(entry, &["description"]),
                url: json_text_any(entry, &["url", "link"]).unwrap_or_default(),
                date_posted: json_text_any(entry, &["posted_date", "date"]),
                ..Default::default()
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn bare_array_and_jobs_wrapper_are_both_accepted() {
        let bare = r#"[{"title":"A","url":"https://x/a"}]"#;
        let wrapped = r#"{"jobs":[{"title":"A","url":"https://x/a"}],"total":1}"#;
        assert_eq!(parse_api_response(bare).unwrap(), parse_api_response(wrapped).unwrap());
        assert!(parse_api_response(r#"{"data":[]}"#).unwrap().is_empty());
        assert!(parse_api_response("\"nope\"").is_err());
        assert!(parse_api_response("not json").is_err());
    }

    #[test]
    fn alias_keys_are_used_when_primary_keys_are_missing() {
        let body = r#"[
            {"title":"Ops","company":"Globex","location":"Lisbon","description":"Run ops",
             "link":"https://globex.example/ops","date":"2026-02-10"},
            {"url":"https://x/1","link":"https://x/ignored","posted_date":"2026-02-11","date":"ignored"},
            42
        ]"#;
        let postings = parse_api_response(body).unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(
            postings[0],
            RawPosting {
                title: "Ops".into(),
                company: Some("Globex".into()),
                location: Some("Lisbon".into()),
                description: Some("Run ops".into()),
                url: "https://globex.example/ops".into(),
                date_posted: Some("2026-02-10".into()),
                ..Default::default()
            }
        );
        assert_eq!(postings[1].title, MISSING_TITLE);
        assert_eq!(postings[1].company, None);
        assert_eq!(postings[1].url, "https://x/1");
        assert_eq!(postings[1].date_posted.as_deref(), Some("2026-02-11"));
    }

    #[tokio::test]
    async fn source_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/jobs"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"jobs":[{"title":"A","url":"u"}]}"#))
            .mount(&server)
            .await;

        let mut source = SourceDescriptor::new("Feed", format!("{}/v1/jobs", server.uri()), AdapterKind::Api);
        source.headers = Some(BTreeMap::from([(
            "Authorization".to_string(),
            "Bearer t0ken".to_string(),
        )]));
        let http = HttpFetcher::new(Default::default()).unwrap();
        let postings = ApiAdapter.fetch_postings(&http, &source).await.unwrap();
        assert_eq!(postings.len(), 1);
    }
}
