//! Paper management commands: `list`, `show`, `remove`.

use anyhow::{bail, Result};

use syntopical_core::models::Document;

use crate::app::{App, EMPTY_CORPUS_HINT};
use crate::config::Config;

pub async fn run_list(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    let papers = app.store().list_documents().await?;
    app.close().await;

    if papers.is_empty() {
        println!("{}", EMPTY_CORPUS_HINT);
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:>6}  TITLE", "ID", "PUBLISHED", "CHUNKS");
    for paper in &papers {
        println!(
            "{:<36}  {:<10}  {:>6}  {}",
            paper.id,
            paper.published.as_deref().unwrap_or("-"),
            paper.chunk_count,
            paper.title
        );
        if !paper.authors.is_empty() {
            println!("{:<36}  {:<10}  {:>6}  by {}", "", "", "", paper.authors.join(", "));
        }
    }
    println!();
    println!("{} papers", papers.len());
    Ok(())
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let store = app.store();
    let doc = store.get_document(id).await?;
    let chunks = store.chunks_for(id).await?;
    app.close().await;

    let Some(doc) = doc else {
        bail!("paper not found: {}", id);
    };
    print_document(&doc, chunks.len());
    Ok(())
}

fn print_document(doc: &Document, chunk_count: usize) {
    let meta = &doc.metadata;
    println!("{}", doc.title);
    println!("  id: {}", doc.id);
    println!("  source: {}", doc.source_uri);
    if !meta.authors.is_empty() {
        println!("  authors: {}", meta.authors.join(", "));
    }
    if let Some(published) = &meta.published {
        println!("  published: {}", published);
    }
    if let Some(doi) = &meta.doi {
        println!("  doi: {}", doi);
    }
    if !meta.keywords.is_empty() {
        println!("  keywords: {}", meta.keywords.join(", "));
    }
    println!("  ingested: {}", doc.ingested_at.format("%Y-%m-%d %H:%M"));
    println!("  chunks: {}", chunk_count);
    if let Some(abstract_text) = &meta.abstract_text {
        println!();
        println!("{}", abstract_text);
    }
}

pub async fn run_remove(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let removed = app.indexer().remove(id).await?;
    app.close().await;

    if !removed {
        bail!("paper not found: {}", id);
    }
    println!("Removed {}", id);
    Ok(())
}
