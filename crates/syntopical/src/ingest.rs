//! Upload pipeline: files → extraction → document → index.
//!
//! Paths may be files or directories. Directories are walked and filtered
//! with the `[upload]` include/exclude globs and only files of a supported
//! type are kept; explicitly named files are always attempted. Each file succeeds or fails on its own and the run
//! prints one line per file plus a summary.
//!
//! Re-uploading a file whose extracted text (and chunking setup) is
//! unchanged is skipped unless `--force` is given.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use syntopical_core::index::Indexer;
use syntopical_core::models::{document_id_for, Document};
use syntopical_core::Error;

use crate::app::App;
use crate::arxiv::ArxivPaper;
use crate::config::{Config, UploadConfig};
use crate::extract::{extract_paper, is_supported, ExtractedPaper};

/// What happened to one uploaded file.
#[derive(Debug)]
pub enum FileOutcome {
    Indexed {
        document_id: String,
        title: String,
        chunks: usize,
    },
    Unchanged {
        document_id: String,
        title: String,
    },
    Failed(Error),
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub files: Vec<(PathBuf, FileOutcome)>,
}

impl UploadReport {
    pub fn indexed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Indexed { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Unchanged { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    /// True when there was at least one file and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.files.is_empty() && self.failed() == self.files.len()
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Expand `paths` into the list of files to upload, in a stable order.
pub fn collect_files(paths: &[PathBuf], upload: &UploadConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&upload.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(upload.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            // Missing files are kept so they are reported as failures.
            files.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(path).follow_links(upload.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }
            let file = entry.path();
            let relative = file.strip_prefix(path).unwrap_or(file);
            let rel_str = relative.to_string_lossy();
            if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
                continue;
            }
            found.push(file.to_path_buf());
        }
        found.sort();
        files.extend(found);
    }

    let mut seen = std::collections::HashSet::new();
    files.retain(|f| seen.insert(f.clone()));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Fingerprint of everything that determines a document's chunks and vectors.
fn content_hash(text: &str, indexer: &Indexer, embedder_model: &str) -> String {
    let params = indexer.params();
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(params.target_tokens.to_le_bytes());
    hasher.update(params.overlap_tokens.to_le_bytes());
    hasher.update(embedder_model.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn source_uri(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

async fn extract_blocking(path: &Path) -> syntopical_core::Result<ExtractedPaper> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_paper(&owned))
        .await
        .map_err(|e| Error::Extraction(format!("{}: extraction aborted: {}", path.display(), e)))?
}

/// Extract and index one file. `arxiv` supplies authoritative metadata for
/// papers fetched from arXiv.
pub async fn ingest_file(
    app: &App,
    indexer: &Indexer,
    path: &Path,
    arxiv: Option<&ArxivPaper>,
    force: bool,
) -> FileOutcome {
    match try_ingest(app, indexer, path, arxiv, force).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "upload failed");
            FileOutcome::Failed(e)
        }
    }
}

async fn try_ingest(
    app: &App,
    indexer: &Indexer,
    path: &Path,
    arxiv: Option<&ArxivPaper>,
    force: bool,
) -> syntopical_core::Result<FileOutcome> {
    let extracted = extract_blocking(path).await?;
    let hash = content_hash(&extracted.text, indexer, app.embedder().model_name());
    let uri = source_uri(path);
    let store = app.store();

    let mut title = extracted.title;
    let mut metadata = extracted.metadata;
    if let Some(paper) = arxiv {
        let from_arxiv = paper.metadata();
        title = paper.title.clone();
        metadata.authors = from_arxiv.authors;
        metadata.published = from_arxiv.published;
        metadata.abstract_text = from_arxiv.abstract_text;
        metadata.extra = from_arxiv.extra;
    }
    if let serde_json::Value::Object(extra) = &mut metadata.extra {
        extra.insert("content_hash".to_string(), serde_json::Value::String(hash.clone()));
    } else {
        metadata.extra = serde_json::json!({ "content_hash": hash });
    }

    if !force {
        if let Some(existing) = store.get_document(&document_id_for(&uri)).await? {
            if existing.metadata.extra.get("content_hash").and_then(|h| h.as_str())
                == Some(hash.as_str())
            {
                return Ok(FileOutcome::Unchanged {
                    document_id: existing.id,
                    title: existing.title,
                });
            }
        }
    }

    let doc = Document::new(title, uri, extracted.text, metadata);
    let result = indexer.index(&doc).await?;
    Ok(FileOutcome::Indexed {
        document_id: result.document_id,
        title: doc.title,
        chunks: result.chunks_indexed,
    })
}

/// Upload every file under `paths`.
pub async fn upload_paths(app: &App, paths: &[PathBuf], force: bool) -> Result<UploadReport> {
    let files = collect_files(paths, &app.config().upload)?;
    let indexer = app.indexer();
    let mut report = UploadReport::default();
    for file in files {
        let outcome = ingest_file(app, &indexer, &file, None, force).await;
        report.files.push((file, outcome));
    }
    Ok(report)
}

pub fn print_report(report: &UploadReport) {
    println!("upload");
    for (path, outcome) in &report.files {
        match outcome {
            FileOutcome::Indexed { title, chunks, .. } => {
                println!("  ok    {} ({} chunks) {}", path.display(), chunks, title)
            }
            FileOutcome::Unchanged { title, .. } => {
                println!("  skip  {} (unchanged) {}", path.display(), title)
            }
            FileOutcome::Failed(e) => println!("  fail  {}: {}", path.display(), e),
        }
    }
    println!(
        "  indexed: {}  unchanged: {}  failed: {}",
        report.indexed(),
        report.unchanged(),
        report.failed()
    );
}

/// `syntopical upload`.
pub async fn run_upload(config: &Config, paths: &[PathBuf], force: bool) -> Result<()> {
    let app = App::open(config).await?;
    let report = upload_paths(&app, paths, force).await?;
    app.close().await;

    if report.files.is_empty() {
        bail!("No files to upload (directory filters: {:?})", config.upload.include_globs);
    }
    print_report(&report);
    if report.all_failed() {
        bail!("All {} files failed to upload", report.files.len());
    }
    Ok(())
}
