//! `syntopical start`: bring papers in, then chat about them.
//!
//! Paths are uploaded as with `upload`, an `--arxiv` query is fetched and
//! indexed as with `arxiv fetch`, and the session then continues as `chat`
//! over the whole corpus.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::{arxiv, chat, ingest};

pub async fn run_start(
    config: &Config,
    paths: &[PathBuf],
    arxiv_query: Option<&str>,
    max_results: Option<usize>,
) -> Result<()> {
    if paths.is_empty() && arxiv_query.is_none() {
        bail!("Nothing to start with: give paper paths or --arxiv <query>");
    }

    if !paths.is_empty() {
        ingest::run_upload(config, paths, false).await?;
    }
    if let Some(query) = arxiv_query {
        arxiv::run_arxiv_fetch(config, query, max_results, false).await?;
    }
    println!();

    chat::run_chat(config, &[]).await
}
