//! NCBI client: PubMed search, publication pages and GEO dataset links.
//!
//! Search goes through the E-utilities `esearch` endpoint. Publication fields
//! and GEO accessions are scraped from the HTML pages, trying each known page
//! layout in turn.

use crate::error::{CsbcError, Result};
use crate::record::{publication_url, RawPublication};
use crate::source::{DatasetSource, PublicationSource};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

/// E-utilities search endpoint
pub const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";

/// GEO DataSets page listing datasets linked from a PubMed record
pub const GDS_LINK_URL: &str = "https://www.ncbi.nlm.nih.gov/gds";

/// Tool name reported to E-utilities
const TOOL_NAME: &str = "rustcsbc";

/// Only GEO series accessions are linked in the table
const SERIES_PREFIX: &str = "GSE";

/// esearch does not page past this many PubMed records
pub const MAX_ESEARCH_RESULTS: usize = 10_000;

/// Client options
#[derive(Debug, Clone)]
pub struct PubMedConfig {
    /// Contact address sent with E-utilities requests
    pub email: Option<String>,
    /// NCBI API key (raises the rate limit from 3 to 10 req/s)
    pub api_key: Option<String>,
    /// Maximum concurrent requests
    pub max_workers: usize,
    pub max_retries: u32,
    /// Maximum identifiers returned by a search
    pub retmax: usize,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            email: None,
            api_key: None,
            max_workers: 3,
            max_retries: 3,
            retmax: MAX_ESEARCH_RESULTS,
        }
    }
}

/// CSS selectors for one generation of the PubMed abstract page
#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    pub name: &'static str,
    pub title: &'static str,
    pub journal: &'static str,
    pub citation: &'static str,
    pub authors: &'static str,
    pub grants: &'static str,
}

/// Legacy `www.ncbi.nlm.nih.gov/pubmed` report page
pub const LEGACY_LAYOUT: PageLayout = PageLayout {
    name: "legacy",
    title: ".rprt.abstract h1",
    journal: ".cit a",
    citation: ".cit",
    authors: "div.auths a",
    grants: r#"div.rprt_all a[abstractlink="yes"][alsec="grnt"]"#,
};

/// Current `pubmed.ncbi.nlm.nih.gov` page
pub const CURRENT_LAYOUT: PageLayout = PageLayout {
    name: "current",
    title: "#full-view-heading h1.heading-title",
    journal: "#full-view-journal-trigger",
    citation: "#full-view-heading span.cit",
    authors: "#full-view-heading .authors-list a.full-name",
    grants: "#grants li",
};

const LAYOUTS: [PageLayout; 2] = [LEGACY_LAYOUT, CURRENT_LAYOUT];

/// NCBI client with concurrency control and retry
pub struct PubMedClient {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    config: PubMedConfig,
}

impl PubMedClient {
    pub fn new(config: PubMedConfig) -> Result<Self> {
        let user_agent = match &config.email {
            Some(email) => format!("{}/{} (mailto:{})", TOOL_NAME, env!("CARGO_PKG_VERSION"), email),
            None => format!("{}/{}", TOOL_NAME, env!("CARGO_PKG_VERSION")),
        };

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CsbcError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_workers.max(1))),
            config,
        })
    }

    /// GET a URL as text, backing off when rate limited
    async fn get_text(&self, url: &Url) -> Result<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CsbcError::Config(format!("Request semaphore closed: {}", e)))?;

        let mut backoff = Duration::from_millis(500);
        let mut last_error = None;

        for attempt in 0..self.config.max_retries.max(1) {
            // jitter keeps concurrent workers from hitting NCBI in lockstep
            let delay = rand::random::<u64>() % 400 + 200;
            tokio::time::sleep(Duration::from_millis(delay)).await;

            match self.do_get(url).await {
                Ok(body) => return Ok(body),
                Err(CsbcError::RateLimited(secs)) => {
                    let wait = Duration::from_secs(secs).max(backoff);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs(),
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                    last_error = Some(CsbcError::RateLimited(secs));
                }
                Err(CsbcError::Network(e)) => {
                    debug!(url = %url, attempt = attempt + 1, error = %e, "Request failed");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    last_error = Some(CsbcError::Network(e));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| CsbcError::Api {
            code: 0,
            message: format!("No response from {}", url),
        }))
    }

    async fn do_get(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CsbcError::RateLimited(2));
        }
        if !status.is_success() {
            return Err(CsbcError::Api {
                code: status.as_u16() as i32,
                message: format!("HTTP error: {}", status),
            });
        }

        Ok(response.text().await?)
    }

    fn esearch_url(&self, query: &str) -> Result<Url> {
        build_esearch_url(
            query,
            self.config.retmax,
            self.config.email.as_deref(),
            self.config.api_key.as_deref(),
        )
    }
}

impl PublicationSource for PubMedClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let url = self.esearch_url(query)?;
        info!(query_len = query.len(), "Searching PubMed");

        let body = self.get_text(&url).await?;
        let ids = parse_esearch(&body)?;

        info!(count = ids.len(), "PubMed search complete");
        Ok(ids)
    }

    async fn fetch_publication(&self, id: &str) -> Result<RawPublication> {
        let url = Url::parse(&publication_url(id)).map_err(|e| CsbcError::Fetch {
            id: id.to_string(),
            message: format!("Invalid publication URL: {}", e),
        })?;

        let html = self
            .get_text(&url)
            .await
            .map_err(|e| into_fetch_error(id, "page request failed", e))?;
        parse_publication_page(id, &html)
    }
}

impl DatasetSource for PubMedClient {
    async fn dataset_accessions(&self, id: &str) -> Result<Vec<String>> {
        let url = build_gds_url(id)?;
        let html = self
            .get_text(&url)
            .await
            .map_err(|e| into_fetch_error(id, "GEO lookup failed", e))?;

        let accessions = parse_dataset_accessions(&html)?;
        debug!(pmid = id, accessions = ?accessions, "GEO accessions");
        Ok(accessions)
    }
}

/// Scope a request failure to one publication.
///
/// Rejected credentials are left alone: they fail every request and end the run.
fn into_fetch_error(id: &str, what: &str, error: CsbcError) -> CsbcError {
    match error {
        CsbcError::Api {
            code: 401 | 403, ..
        } => error,
        other => CsbcError::Fetch {
            id: id.to_string(),
            message: format!("{}: {}", what, other),
        },
    }
}

/// Build the esearch URL for a grant query
pub fn build_esearch_url(
    query: &str,
    retmax: usize,
    email: Option<&str>,
    api_key: Option<&str>,
) -> Result<Url> {
    let mut url = Url::parse(ESEARCH_URL)
        .map_err(|e| CsbcError::Config(format!("Invalid esearch URL: {}", e)))?;

    {
        let mut params = url.query_pairs_mut();
        params.append_pair("db", "pubmed");
        params.append_pair("sort", "relevance");
        params.append_pair("retmode", "json");
        params.append_pair("retmax", &retmax.to_string());
        params.append_pair("tool", TOOL_NAME);
        params.append_pair("term", query);
        if let Some(email) = email {
            params.append_pair("email", email);
        }
        if let Some(key) = api_key {
            params.append_pair("api_key", key);
        }
    }

    Ok(url)
}

/// Build the GEO DataSets link page URL for a publication
pub fn build_gds_url(id: &str) -> Result<Url> {
    let mut url = Url::parse(GDS_LINK_URL)
        .map_err(|e| CsbcError::Config(format!("Invalid GEO URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("LinkName", "pubmed_gds")
        .append_pair("from_uid", id);
    Ok(url)
}

// === esearch Response Types ===

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

/// Read identifiers out of an esearch JSON body
pub fn parse_esearch(body: &str) -> Result<Vec<String>> {
    let response: EsearchResponse = serde_json::from_str(body)?;
    if let Some(message) = response.esearchresult.error {
        return Err(CsbcError::Api { code: 0, message });
    }
    Ok(response.esearchresult.idlist)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| CsbcError::Parse(e.to_string()))
}

fn element_text(element: ElementRef<'_>, whitespace: &Regex) -> String {
    let text = element.text().collect::<String>();
    whitespace.replace_all(text.trim(), " ").to_string()
}

fn first_text(document: &Html, css: &str, whitespace: &Regex) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .map(|e| element_text(e, whitespace))
        .filter(|t| !t.is_empty()))
}

fn all_text(document: &Html, css: &str, whitespace: &Regex) -> Result<Vec<String>> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(|e| element_text(e, whitespace))
        .filter(|t| !t.is_empty())
        .collect())
}

/// The current layout shows the citation without the journal in front;
/// the date fragment is located relative to the journal's `.`.
fn compose_citation(journal: &str, citation: &str) -> String {
    let journal = journal.trim().trim_end_matches('.');
    if journal.is_empty() || citation.starts_with(journal) {
        citation.to_string()
    } else {
        format!("{}. {}", journal, citation)
    }
}

/// Parse a PubMed abstract page into raw publication fields.
///
/// Missing authors or citation are left empty; the record builder decides
/// whether that is fatal.
pub fn parse_publication_page(id: &str, html: &str) -> Result<RawPublication> {
    let document = Html::parse_document(html);
    let whitespace = Regex::new(r"\s+").map_err(|e| CsbcError::Parse(e.to_string()))?;

    for layout in LAYOUTS {
        let Some(title) = first_text(&document, layout.title, &whitespace)? else {
            continue;
        };

        let journal = first_text(&document, layout.journal, &whitespace)?.unwrap_or_default();
        let citation = first_text(&document, layout.citation, &whitespace)?.unwrap_or_default();

        debug!(pmid = id, layout = layout.name, "Parsed publication page");

        return Ok(RawPublication {
            id: id.to_string(),
            title,
            citation: compose_citation(&journal, &citation),
            journal,
            authors: all_text(&document, layout.authors, &whitespace)?,
            grants: all_text(&document, layout.grants, &whitespace)?,
            dataset_accessions: Vec::new(),
        });
    }

    Err(CsbcError::Fetch {
        id: id.to_string(),
        message: "Unrecognized publication page layout".to_string(),
    })
}

/// Series accessions listed on a GEO DataSets link page
pub fn parse_dataset_accessions(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let report_selector = selector(".rprtid")?;
    let dd_selector = selector("dd")?;

    let mut accessions = Vec::new();
    for report in document.select(&report_selector) {
        let Some(dd) = report.select(&dd_selector).next() else {
            continue;
        };
        let accession = dd.text().collect::<String>().trim().to_string();
        if accession.contains(SERIES_PREFIX) && !accessions.contains(&accession) {
            accessions.push(accession);
        }
    }

    Ok(accessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_PAGE: &str = r##"
        <html><body>
        <div class="rprt abstract">
            <div class="cit"><a href="#">Nature.</a> 2015 Jun 3;521(7553):E1-2. doi: 10.1038/nature14000.</div>
            <h1>Tumour   evolution
                in space and time.</h1>
            <div class="auths"><a href="#">Smith J</a>, <a href="#">Doe A</a></div>
        </div>
        <div class="rprt_all">
            <a abstractlink="yes" alsec="grnt" href="#">U54 CA209997/CA/NCI NIH HHS/United States</a>
            <a abstractlink="yes" alsec="grnt" href="#">R01 GM000001/GM/NIGMS NIH HHS/United States</a>
            <a abstractlink="yes" alsec="mesh" href="#">Neoplasms</a>
        </div>
        </body></html>"##;

    const CURRENT_PAGE: &str = r#"
        <html><body>
        <header id="full-view-heading">
            <button id="full-view-journal-trigger">Cancer Res</button>
            <span class="cit">2016 Jan 15;76(2):1-10.</span>
            <h1 class="heading-title">Clonal dynamics under therapy</h1>
            <div class="authors-list">
                <span class="authors-list-item"><a class="full-name">Ana Lee</a></span>
            </div>
        </header>
        <div id="grants"><ul><li>U01 CA184898/CA/NCI NIH HHS/United States</li></ul></div>
        </body></html>"#;

    #[test]
    fn test_build_esearch_url() {
        let url = build_esearch_url("CA209997 or CA184898", 100, Some("me@example.org"), None)
            .expect("Failed to build URL");
        assert!(url.as_str().contains("term=CA209997+or+CA184898"));
        assert!(url.as_str().contains("retmode=json"));
        assert!(url.as_str().contains("email=me%40example.org"));
        assert!(!url.as_str().contains("api_key"));
    }

    #[test]
    fn test_build_gds_url() {
        let url = build_gds_url("26000001").expect("Failed to build URL");
        assert_eq!(
            url.as_str(),
            "https://www.ncbi.nlm.nih.gov/gds?LinkName=pubmed_gds&from_uid=26000001"
        );
    }

    #[test]
    fn test_into_fetch_error() {
        let not_found = CsbcError::Api {
            code: 404,
            message: "HTTP error: 404 Not Found".to_string(),
        };
        let scoped = into_fetch_error("7", "page request failed", not_found);
        assert!(scoped.is_per_publication());
        assert!(scoped.to_string().contains("404"));

        let forbidden = CsbcError::Api {
            code: 403,
            message: "HTTP error: 403 Forbidden".to_string(),
        };
        assert!(!into_fetch_error("7", "page request failed", forbidden).is_per_publication());
    }

    #[test]
    fn test_parse_esearch() {
        let body = r#"{"header":{},"esearchresult":{"count":"2","idlist":["29000001","28000002"]}}"#;
        assert_eq!(parse_esearch(body).expect("parse"), vec!["29000001", "28000002"]);

        let error = r#"{"esearchresult":{"ERROR":"Invalid query"}}"#;
        assert!(matches!(parse_esearch(error), Err(CsbcError::Api { .. })));
    }

    #[test]
    fn test_parse_legacy_page() {
        let raw = parse_publication_page("26000001", LEGACY_PAGE).expect("parse");
        assert_eq!(raw.title, "Tumour evolution in space and time.");
        assert_eq!(raw.journal, "Nature.");
        assert!(raw.citation.starts_with("Nature. 2015 Jun 3;"));
        assert_eq!(raw.authors, vec!["Smith J", "Doe A"]);
        assert_eq!(raw.grants.len(), 2);
        assert!(raw.dataset_accessions.is_empty());
    }

    #[test]
    fn test_parse_current_page() {
        let raw = parse_publication_page("26000002", CURRENT_PAGE).expect("parse");
        assert_eq!(raw.title, "Clonal dynamics under therapy");
        assert_eq!(raw.citation, "Cancer Res. 2016 Jan 15;76(2):1-10.");
        assert_eq!(raw.authors, vec!["Ana Lee"]);
        assert_eq!(raw.grants, vec!["U01 CA184898/CA/NCI NIH HHS/United States"]);
    }

    #[test]
    fn test_parse_unknown_layout() {
        let err = parse_publication_page("1", "<html><body></body></html>").expect_err("no layout");
        assert!(matches!(err, CsbcError::Fetch { .. }));
    }

    #[test]
    fn test_parse_dataset_accessions() {
        let html = r#"
            <div class="rprt"><div class="rprtid"><dl><dt>Accession:</dt><dd> GSE68950 </dd></dl></div></div>
            <div class="rprt"><div class="rprtid"><dl><dt>Accession:</dt><dd>GDS5826</dd></dl></div></div>
            <div class="rprt"><div class="rprtid"><dl><dt>Accession:</dt><dd>GSE70138</dd></dl></div></div>
        "#;
        assert_eq!(
            parse_dataset_accessions(html).expect("parse"),
            vec!["GSE68950", "GSE70138"]
        );
        assert!(parse_dataset_accessions("<html></html>").expect("parse").is_empty());
    }
}
