//! Article metadata scraping
//!
//! Article details come from the CAPES journal portal detail page; the works an article
//! cites come from the OpenAlex API.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info};

use super::{http_client, transport_error};
use crate::config::ScraperConfig;
use crate::db::{NewArticle, NewCitation};
use crate::errors::{AppError, Result};
use crate::metrics;

/// Source of article data for the import pipeline
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetch an article and its outgoing references by source id
    async fn fetch_article(&self, source_id: &str) -> Result<NewArticle>;
}

/// CAPES portal + OpenAlex scraper
pub struct CapesScraper {
    config: ScraperConfig,
    client: reqwest::Client,
}

impl CapesScraper {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let client = http_client(config.timeout_secs, Some(&config.user_agent))?;
        Ok(Self { config, client })
    }

    async fn get(&self, service: &'static str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(AppError::external(
                service,
                format!("HTTP {}", response.status()),
            )),
            Err(e) => Err(transport_error(service, e)),
        };
        metrics::record_external(service, result.is_ok(), start.elapsed());
        result
    }

    async fn fetch_detail_page(&self, source_id: &str) -> Result<String> {
        let url = format!("{}{}", self.config.detail_url, source_id);
        let response = self.get("capes", self.client.get(&url)).await?;
        response
            .text()
            .await
            .map_err(|e| transport_error("capes", e))
    }

    async fn fetch_references(&self, source_id: &str) -> Result<Vec<NewCitation>> {
        let url = format!("{}/works", self.config.openalex_url.trim_end_matches('/'));
        let request = self
            .client
            .get(&url)
            .query(&[("filter", format!("cited_by:{}", source_id))]);
        let works: OpenAlexWorks = self
            .get("openalex", request)
            .await?
            .json()
            .await
            .map_err(|e| AppError::ExternalFormat {
                message: format!("Failed to parse OpenAlex response: {}", e),
            })?;
        Ok(parse_openalex_works(works))
    }
}

#[async_trait]
impl ArticleSource for CapesScraper {
    async fn fetch_article(&self, source_id: &str) -> Result<NewArticle> {
        let html = self.fetch_detail_page(source_id).await?;
        let mut article = parse_detail_page(source_id, &html)?;
        article.citations = self.fetch_references(source_id).await?;

        info!(
            source_id,
            topics = article.topics.len(),
            citations = article.citations.len(),
            "Article scraped"
        );
        Ok(article)
    }
}

// ============================================================================
// Detail Page Parsing
// ============================================================================

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Internal {
        message: format!("Invalid selector {}: {:?}", css, e),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first element matching `css`, empty when absent
fn first_text(root: ElementRef<'_>, css: &str) -> Result<String> {
    let sel = selector(css)?;
    Ok(root.select(&sel).next().map(element_text).unwrap_or_default())
}

fn has_match(root: ElementRef<'_>, css: &str) -> Result<bool> {
    let sel = selector(css)?;
    Ok(root.select(&sel).next().is_some())
}

/// Text of the `<p>` directly following the `<strong>` label containing `label`
fn labelled_paragraph(root: ElementRef<'_>, label: &str) -> Result<String> {
    let strong = selector("strong")?;
    let paragraph = root
        .select(&strong)
        .find(|el| el.text().collect::<String>().contains(label))
        .and_then(|el| el.next_siblings().find_map(ElementRef::wrap))
        .filter(|el| el.value().name() == "p");
    Ok(paragraph.map(element_text).unwrap_or_default())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn leading_year(raw: &str) -> Option<i32> {
    let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse a CAPES detail page into an article without references
pub fn parse_detail_page(source_id: &str, html: &str) -> Result<NewArticle> {
    let document = Html::parse_document(html);
    let content_sel = selector("#content-print")?;
    let content = document
        .select(&content_sel)
        .next()
        .ok_or_else(|| AppError::ExternalFormat {
            message: format!("Detail page for {} has no article content", source_id),
        })?;

    let title = first_text(content, "#item-titulo")?;
    if title.is_empty() {
        return Err(AppError::ExternalFormat {
            message: format!("Detail page for {} has no title", source_id),
        });
    }

    let institution = first_text(content, "#item-instituicao")?.replacen(';', "", 1);
    let volume = first_text(content, "#item-volume")?
        .replacen("Volume:", "", 1)
        .replacen(';', "", 1);
    let issue = first_text(content, "#item-issue")?.replacen("Issue:", "", 1);
    let language = first_text(content, "#item-language")?.replacen("Linguagem:", "", 1);

    let mut article = NewArticle::new(source_id, title);
    article.abstract_text = first_text(content, "#item-resumo")?;
    article.publication_type = non_empty(first_text(content, "#type-publicacao")?);
    article.publication_year = leading_year(&first_text(content, "#item-ano")?.replacen(';', "", 1));
    article.institutions = non_empty(institution.trim().to_string()).into_iter().collect();
    article.volume = non_empty(volume.trim().to_string());
    article.issue = non_empty(issue.trim().to_string());
    article.language = language.trim().to_string();
    article.doi = non_empty(first_text(content, ".small.text-muted.mb-3.block")?);
    article.issn = non_empty(labelled_paragraph(content, "ISSN")?);
    article.authors = split_list(&first_text(content, "#item-autores")?);
    article.topics = split_list(&labelled_paragraph(content, "Tópico(s)")?);
    article.is_open_access = has_match(content, ".open-acess")?;
    article.peer_reviewed = has_match(content, ".fa-book-reader")?;

    debug!(source_id, authors = article.authors.len(), "Parsed detail page");
    Ok(article)
}

// ============================================================================
// OpenAlex References
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct OpenAlexWorks {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    #[serde(default)]
    primary_location: Option<Location>,
    #[serde(default)]
    biblio: Biblio,
    #[serde(default)]
    publication_year: Option<i32>,
    #[serde(default)]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: AuthorRef,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    source: Option<SourceRef>,
    #[serde(default)]
    landing_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceRef {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Biblio {
    #[serde(default)]
    volume: Option<String>,
    #[serde(default)]
    issue: Option<String>,
    #[serde(default)]
    first_page: Option<String>,
}

/// Short work id from an OpenAlex URL (`https://openalex.org/W123` -> `W123`)
fn short_work_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// Convert an OpenAlex works listing into external citations
pub fn parse_openalex_works(works: OpenAlexWorks) -> Vec<NewCitation> {
    works
        .results
        .into_iter()
        .map(|work| {
            let (journal, url) = match work.primary_location {
                Some(location) => (
                    location.source.and_then(|s| s.display_name),
                    location.landing_page_url,
                ),
                None => (None, None),
            };
            NewCitation {
                cited_article_id: None,
                work_id: work.id.as_deref().map(short_work_id).map(str::to_string),
                title: work.title,
                authors: work
                    .authorships
                    .into_iter()
                    .filter_map(|a| a.author.display_name)
                    .collect(),
                journal,
                volume: work.biblio.volume,
                issue: work.biblio.issue,
                pages: work.biblio.first_page,
                year: work.publication_year,
                doi: work.doi,
                url,
            }
        })
        .collect()
}
