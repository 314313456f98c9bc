use async_trait::async_trait;
use jobscout_core::{AdapterKind, RawPosting, SourceDescriptor, MISSING_TITLE};
use jobscout_storage::HttpFetcher;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::{element_text, parse_selector, resolve_url, select_first_text, AdapterError, SourceAdapter};

const DEFAULT_CONTAINER: &str = "div";
const DEFAULT_TITLE: &str = "h2";
const DEFAULT_LINK: &str = "a";

/// Career pages read with selectors from the descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAdapter;

#[async_trait]
impl SourceAdapter for GenericAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Generic
    }

    async fn fetch_postings(
        &self,
        http: &HttpFetcher,
        source: &SourceDescriptor,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let page = http.fetch_text(&source.url, None).await?;
        parse_generic_page(source, &page.body)
    }
}

struct FieldSelectors {
    container: Selector,
    title: Selector,
    link: Selector,
    location: Option<Selector>,
    description: Option<Selector>,
    date_posted: Option<Selector>,
}

impl FieldSelectors {
    fn from_source(source: &SourceDescriptor) -> Result<Self, AdapterError> {
        let optional = |field: &str| source.selector(field).map(parse_selector).transpose();
        Ok(Self {
            container: parse_selector(source.selector("job_container").unwrap_or(DEFAULT_CONTAINER))?,
            title: parse_selector(source.selector("title").unwrap_or(DEFAULT_TITLE))?,
            link: parse_selector(source.selector("link").unwrap_or(DEFAULT_LINK))?,
            location: optional("location")?,
            description: optional("description")?,
            date_posted: optional("date_posted")?,
        })
    }
}

pub fn parse_generic_page(
    source: &SourceDescriptor,
    html: &str,
) -> Result<Vec<RawPosting>, AdapterError> {
    let selectors = FieldSelectors::from_source(source)?;
    let document = Html::parse_document(html);

    let mut postings = Vec::new();
    for container in document.select(&selectors.container) {
        match extract_container(source, &selectors, container) {
            Ok(posting) => postings.push(posting),
            Err(err) => debug!(source = %source.name, error = %err, "skipping job container"),
        }
    }
    Ok(postings)
}

fn extract_container(
    source: &SourceDescriptor,
    selectors: &FieldSelectors,
    container: ElementRef<'_>,
) -> Result<RawPosting, AdapterError> {
    // Minimal listing pages use the anchor itself as the job block.
    if container.value().name() == "a" {
        if let Some(href) = container.value().attr("href").filter(|h| !h.is_empty()) {
            return Ok(RawPosting::new(element_text(container), resolve_url(&source.url, href)?));
        }
    }

    let optional_text =
        |selector: &Option<Selector>| selector.as_ref().and_then(|s| select_first_text(container, s));

    let url = match container
        .select(&selectors.link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .filter(|h| !h.is_empty())
    {
        Some(href) => resolve_url(&source.url, href)?,
        None => String::new(),
    };

    Ok(RawPosting {
        title: select_first_text(container, &selectors.title)
            .unwrap_or_else(|| MISSING_TITLE.to_string()),
        location: optional_text(&selectors.location),
        description: optional_text(&selectors.description),
        url,
        date_posted: optional_text(&selectors.date_posted),
        ..Default::default()
    })
}
