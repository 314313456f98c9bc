use async_trait::async_trait;
use jobscout_core::{AdapterKind, RawPosting, SourceDescriptor, MISSING_TITLE};
use jobscout_storage::HttpFetcher;
use scraper::Html;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::{element_text, json_text, parse_selector, resolve_url, AdapterError, SourceAdapter};

const FEED_SUFFIX: &str = "/embed/jobs.json";
const SECTION_SELECTOR: &str = "section.level-0";
const OPENING_LINK_SELECTOR: &str = "div.opening a";

/// Greenhouse boards: JSON job feed first, listing HTML when the feed is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreenhouseAdapter;

#[async_trait]
impl SourceAdapter for GreenhouseAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Greenhouse
    }

    async fn fetch_postings(
        &self,
        http: &HttpFetcher,
        source: &SourceDescriptor,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let feed_url = greenhouse_feed_url(&source.url);
        let feed = match http.fetch_text(&feed_url, None).await {
            Ok(resp) => parse_greenhouse_feed(&resp.body),
            Err(err) => Err(AdapterError::from(err)),
        };
        match feed {
            Ok(postings) => Ok(postings),
            Err(err) => {
                info!(source = %source.name, reason = %err, "greenhouse feed unavailable, reading listing html");
                let page = http.fetch_text(&source.url, None).await?;
                parse_greenhouse_html(source, &page.body)
            }
        }
    }
}

pub fn greenhouse_feed_url(base: &str) -> String {
    format!("{}{FEED_SUFFIX}", base.trim_end_matches('/'))
}

/// Maps the `{ "jobs": [...] }` feed. Anything that is not a JSON object is a schema mismatch.
pub fn parse_greenhouse_feed(body: &str) -> Result<Vec<RawPosting>, AdapterError> {
    let feed: JsonValue = serde_json::from_str(body)?;
    if !feed.is_object() {
        return Err(AdapterError::Message("greenhouse feed is not a JSON object".into()));
    }
    let jobs = match feed.get("jobs") {
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(JsonValue::Array(jobs)) => jobs,
        Some(_) => return Err(AdapterError::Message("greenhouse feed `jobs` is not an array".into())),
    };

    Ok(jobs
        .iter()
        .filter_map(|job| {
            if !job.is_object() {
                debug!("skipping malformed greenhouse job entry");
                return None;
            }
            Some(RawPosting {
                title: json_text(job, &["title"]).unwrap_or_else(|| MISSING_TITLE.to_string()),
                location: json_text(job, &["location", "name"]),
                url: json_text(job, &["absolute_url"]).unwrap_or_default(),
                date_posted: json_text(job, &["updated_at"]),
                ..Default::default()
            })
        })
        .collect())
}

/// Reads the classic board layout: openings grouped into top-level department sections.
pub fn parse_greenhouse_html(
    source: &SourceDescriptor,
    html: &str,
) -> Result<Vec<RawPosting>, AdapterError> {
    let sections = parse_selector(SECTION_SELECTOR)?;
    let links = parse_selector(OPENING_LINK_SELECTOR)?;
    let document = Html::parse_document(html);

    let mut postings = Vec::new();
    for section in document.select(&sections) {
        for link in section.select(&links) {
            let href = link.value().attr("href").unwrap_or_default();
            match resolve_url(&source.url, href) {
                Ok(url) => postings.push(RawPosting::new(element_text(link), url)),
                Err(err) => debug!(source = %source.name, error = %err, "skipping greenhouse opening"),
            }
        }
    }
    Ok(postings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use jobscout_storage::HttpClientConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING: &str = r#"
        <section class="level-0">
          <h3>Engineering</h3>
          <div class="opening"><a href="/acme/jobs/1">Backend Engineer</a><span class="location">Remote</span></div>
          <div class="opening"><a href="/acme/jobs/2">Frontend Engineer</a></div>
        </section>
        <section class="level-0">
          <div class="opening"><a href="/acme/jobs/3">Recruiter</a></div>
        </section>
        <div class="opening"><a href="/acme/jobs/4">Outside any section</a></div>"#;

    fn http() -> HttpFetcher {
        HttpFetcher::new(Default::default()).unwrap()
    }

    /// Address that nothing listens on once the listener is dropped.
    fn closed_local_addr() -> std::net::SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn feed_url_appends_suffix_once() {
        assert_eq!(
            greenhouse_feed_url("https://boards.greenhouse.io/acme/"),
            "https://boards.greenhouse.io/acme/embed/jobs.json"
        );
    }

    #[test]
    fn feed_maps_nested_location_and_skips_non_objects() {
        let body = r#"{"jobs":[
            {"title":"SRE","location":{"name":"Dublin"},"absolute_url":"https://x/1","updated_at":"2026-01-02T00:00:00Z"},
            "garbage",
            {"location":{}}
        ]}"#;
        let postings = parse_greenhouse_feed(body).unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].location.as_deref(), Some("Dublin"));
        assert_eq!(postings[0].date_posted.as_deref(), Some("2026-01-02T00:00:00Z"));
        assert_eq!(postings[1].title, MISSING_TITLE);
    }

    #[test]
    fn non_object_feed_is_a_schema_mismatch() {
        assert!(parse_greenhouse_feed("[1,2]").is_err());
        assert!(parse_greenhouse_feed("<html></html>").is_err());
        assert!(parse_greenhouse_feed("{}").unwrap().is_empty());
    }

    #[test]
    fn html_reads_only_sectioned_openings() {
        let source = SourceDescriptor::new("Acme", "https://boards.greenhouse.io/acme", AdapterKind::Greenhouse);
        let postings = parse_greenhouse_html(&source, LISTING).unwrap();
        let titles: Vec<_> = postings.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Backend Engineer", "Frontend Engineer", "Recruiter"]);
        assert_eq!(postings[0].url, "https://boards.greenhouse.io/acme/jobs/1");
        assert!(postings.iter().all(|p| p.location.is_none() && p.date_posted.is_none()));
    }

    #[tokio::test]
    async fn feed_404_falls_back_to_listing_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/embed/jobs.json"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(1)
            .mount(&server)
            .await;

        let source = SourceDescriptor::new("Acme", format!("{}/acme", server.uri()), AdapterKind::Greenhouse);
        let postings = GreenhouseAdapter.fetch_postings(&http(), &source).await.unwrap();
        assert_eq!(postings.len(), 3);
    }

    #[tokio::test]
    async fn unparseable_feed_falls_back_to_listing_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/embed/jobs.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let source = SourceDescriptor::new("Acme", format!("{}/acme", server.uri()), AdapterKind::Greenhouse);
        let postings = GreenhouseAdapter.fetch_postings(&http(), &source).await.unwrap();
        assert_eq!(postings.len(), 3);
    }

    #[tokio::test]
    async fn working_feed_skips_the_html_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/embed/jobs.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"jobs":[{"title":"SRE","absolute_url":"https://x/1"}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(0)
            .mount(&server)
            .await;

        let source = SourceDescriptor::new("Acme", format!("{}/acme", server.uri()), AdapterKind::Greenhouse);
        let postings = GreenhouseAdapter.fetch_postings(&http(), &source).await.unwrap();
        assert_eq!(postings, vec![RawPosting::new("SRE", "https://x/1")]);
    }

    #[tokio::test]
    async fn feed_timeout_falls_back_to_listing_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/embed/jobs.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"jobs":[]}"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(1)
            .mount(&server)
            .await;

        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_millis(300),
            ..Default::default()
        })
        .unwrap();
        let source = SourceDescriptor::new("Acme", format!("{}/acme", server.uri()), AdapterKind::Greenhouse);
        let postings = GreenhouseAdapter.fetch_postings(&http, &source).await.unwrap();
        assert_eq!(postings.len(), 3);
    }

    #[tokio::test]
    async fn refused_connection_is_a_fetch_error() {
        let addr = closed_local_addr();
        let source = SourceDescriptor::new("Acme", format!("http://{addr}/acme"), AdapterKind::Greenhouse);
        let err = GreenhouseAdapter.fetch_postings(&http(), &source).await.unwrap_err();
        assert!(matches!(err, AdapterError::Fetch(_)));
    }
}
