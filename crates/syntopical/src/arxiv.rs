//! arXiv paper search and download.
//!
//! Queries the arXiv Atom API (`{url}/query`) and parses the feed with
//! `quick-xml`. Downloads land in `arxiv.download_dir` as `{arxiv_id}.pdf`;
//! files that already exist are not fetched again.

use std::path::PathBuf;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use syntopical_core::models::PaperMetadata;

use crate::app::App;
use crate::config::{ArxivConfig, Config};
use crate::http;
use crate::ingest::{ingest_file, print_report, UploadReport};

const ARXIV_URL: &str = "https://export.arxiv.org/api";
const ARXIV_TIMEOUT_SECS: u64 = 60;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArxivPaper {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    /// `YYYY-MM-DD`.
    pub published: String,
    pub pdf_url: String,
    pub entry_id: String,
    /// Short id with version, e.g. `2101.00001v2`.
    pub arxiv_id: String,
    pub categories: Vec<String>,
}

impl ArxivPaper {
    /// Bibliographic metadata to store with the downloaded PDF.
    pub fn metadata(&self) -> PaperMetadata {
        PaperMetadata {
            authors: self.authors.clone(),
            published: (!self.published.is_empty()).then(|| self.published.clone()),
            abstract_text: (!self.summary.is_empty()).then(|| self.summary.clone()),
            doi: None,
            keywords: Vec::new(),
            extra: serde_json::json!({
                "arxiv_id": self.arxiv_id,
                "entry_id": self.entry_id,
                "categories": self.categories,
            }),
        }
    }

    /// File name for the PDF; old-style ids (`hep-th/9901001v1`) contain a slash.
    pub fn file_name(&self) -> String {
        format!("{}.pdf", self.arxiv_id.replace('/', "_"))
    }
}

/// Outcome of [`ArxivClient::search_and_download`].
#[derive(Debug, Default)]
pub struct FetchReport {
    pub downloaded: Vec<(ArxivPaper, PathBuf)>,
    pub failed: Vec<(ArxivPaper, anyhow::Error)>,
}

pub struct ArxivClient {
    client: reqwest::Client,
    url: String,
    download_dir: PathBuf,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(ARXIV_TIMEOUT_SECS)?,
            url: config.url.clone().unwrap_or_else(|| ARXIV_URL.to_string()),
            download_dir: config.download_dir.clone(),
        })
    }

    /// Search arXiv by relevance.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ArxivPaper>> {
        let response = self
            .client
            .get(format!("{}/query", self.url.trim_end_matches('/')))
            .query(&[
                ("search_query", format!("all:{query}")),
                ("start", "0".to_string()),
                ("max_results", max_results.to_string()),
                ("sortBy", "relevance".to_string()),
            ])
            .send()
            .await
            .context("arXiv search request failed")?
            .error_for_status()
            .context("arXiv search returned an error")?;

        let feed = response.text().await.context("Failed to read arXiv response")?;
        let mut papers = parse_feed(&feed)?;
        papers.truncate(max_results);
        tracing::debug!(query, hits = papers.len(), "arxiv search");
        Ok(papers)
    }

    /// Download the paper's PDF unless it is already present.
    pub async fn download(&self, paper: &ArxivPaper) -> Result<PathBuf> {
        let path = self.download_dir.join(paper.file_name());
        if path.exists() {
            tracing::debug!(path = %path.display(), "arxiv pdf already downloaded");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| {
                format!("Failed to create download dir: {}", self.download_dir.display())
            })?;

        let bytes = self
            .client
            .get(&paper.pdf_url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", paper.pdf_url))?
            .error_for_status()
            .with_context(|| format!("Failed to fetch {}", paper.pdf_url))?
            .bytes()
            .await?;

        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(arxiv_id = %paper.arxiv_id, path = %path.display(), "downloaded");
        Ok(path)
    }

    /// Search, then download every hit. A failed download is recorded in the
    /// report and does not stop the others.
    pub async fn search_and_download(&self, query: &str, max_results: usize) -> Result<FetchReport> {
        let papers = self.search(query, max_results).await?;
        let mut report = FetchReport::default();
        for paper in papers {
            match self.download(&paper).await {
                Ok(path) => report.downloaded.push((paper, path)),
                Err(e) => {
                    tracing::warn!(title = %paper.title, error = %e, "arxiv download failed");
                    report.failed.push((paper, e));
                }
            }
        }
        Ok(report)
    }
}

/// `syntopical arxiv search`.
pub async fn run_arxiv_search(config: &Config, query: &str, max_results: Option<usize>) -> Result<()> {
    let client = ArxivClient::new(&config.arxiv)?;
    let papers = client
        .search(query, max_results.unwrap_or(config.arxiv.max_results))
        .await?;
    if papers.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, paper) in papers.iter().enumerate() {
        println!("{}. {}", i + 1, paper.title);
        println!("    authors: {}", paper.authors.join(", "));
        println!("    published: {}", paper.published);
        println!("    arxiv: {}", paper.arxiv_id);
        println!("    pdf: {}", paper.pdf_url);
        println!();
    }
    Ok(())
}

/// `syntopical arxiv fetch`: download the hits and (unless `no_index`)
/// upload them with their arXiv metadata.
pub async fn run_arxiv_fetch(
    config: &Config,
    query: &str,
    max_results: Option<usize>,
    no_index: bool,
) -> Result<()> {
    let client = ArxivClient::new(&config.arxiv)?;
    let report = client
        .search_and_download(query, max_results.unwrap_or(config.arxiv.max_results))
        .await?;

    println!("arxiv fetch");
    for (paper, e) in &report.failed {
        println!("  fail  {}: {:#}", paper.arxiv_id, e);
    }
    if report.downloaded.is_empty() {
        println!("  downloaded: 0");
        return Ok(());
    }

    if no_index {
        for (paper, path) in &report.downloaded {
            println!("  saved {} {}", path.display(), paper.title);
        }
        println!("  downloaded: {}", report.downloaded.len());
        return Ok(());
    }

    let app = App::open(config).await?;
    let indexer = app.indexer();
    let mut upload = UploadReport::default();
    for (paper, path) in &report.downloaded {
        let outcome = ingest_file(&app, &indexer, path, Some(paper), false).await;
        upload.files.push((path.clone(), outcome));
    }
    app.close().await;
    print_report(&upload);
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
    categories: Vec<String>,
}

impl EntryBuilder {
    fn link(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let mut href = None;
        let mut is_pdf = false;
        for attr in e.attributes() {
            let attr = attr?;
            let value = attr.unescape_value()?;
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(value.into_owned()),
                b"title" if value == "pdf" => is_pdf = true,
                b"type" if value == "application/pdf" => is_pdf = true,
                _ => {}
            }
        }
        if is_pdf {
            self.pdf_url = href;
        }
        Ok(())
    }

    fn category(&mut self, e: &BytesStart<'_>) -> Result<()> {
        for attr in e.attributes() {
            let attr = attr?;
            if attr.key.local_name().as_ref() == b"term" {
                let term = attr.unescape_value()?.into_owned();
                if !self.categories.contains(&term) {
                    self.categories.push(term);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> ArxivPaper {
        let entry_id = self.id.trim().to_string();
        let arxiv_id = entry_id
            .rsplit_once("/abs/")
            .map_or(entry_id.as_str(), |(_, id)| id)
            .to_string();
        let pdf_url = self
            .pdf_url
            .unwrap_or_else(|| entry_id.replacen("/abs/", "/pdf/", 1));
        ArxivPaper {
            title: collapse_whitespace(&self.title),
            authors: self.authors,
            summary: collapse_whitespace(&self.summary),
            published: self.published.trim().chars().take(10).collect(),
            pdf_url,
            entry_id,
            arxiv_id,
            categories: self.categories,
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an arXiv Atom feed into papers, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivPaper>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut field = Field::None;

    loop {
        match reader.read_event().context("Malformed arXiv feed")? {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    entry = Some(EntryBuilder::default());
                } else if let Some(b) = entry.as_mut() {
                    match name.as_ref() {
                        b"id" => field = Field::Id,
                        b"title" => field = Field::Title,
                        b"summary" => field = Field::Summary,
                        b"published" => field = Field::Published,
                        b"name" => field = Field::AuthorName,
                        b"link" => b.link(&e)?,
                        b"category" => b.category(&e)?,
                        _ => {}
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(b) = entry.as_mut() {
                    match e.local_name().as_ref() {
                        b"link" => b.link(&e)?,
                        b"category" => b.category(&e)?,
                        _ => {}
                    }
                }
            }
            Event::Text(t) => {
                if let Some(b) = entry.as_mut() {
                    let text = t.unescape()?;
                    match field {
                        Field::Id => b.id.push_str(&text),
                        Field::Title => b.title.push_str(&text),
                        Field::Summary => b.summary.push_str(&text),
                        Field::Published => b.published.push_str(&text),
                        Field::AuthorName => b.authors.push(collapse_whitespace(&text)),
                        Field::None => {}
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(b) = entry.take() {
                        papers.push(b.finish());
                    }
                }
                field = Field::None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(papers)
}
