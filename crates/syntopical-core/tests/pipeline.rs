//! End-to-end pipeline tests against the in-memory store and the hashing
//! embedder, with fake collaborators for failure paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;

use syntopical_core::analysis::{AnalysisConfig, Analyst};
use syntopical_core::assemble::{assemble, AssembledContext, AssemblyOptions};
use syntopical_core::chunk::{chunk_text, estimate_tokens, ChunkParams, CHARS_PER_TOKEN};
use syntopical_core::embedding::{Embedder, HashingEmbedder};
use syntopical_core::index::Indexer;
use syntopical_core::llm::LanguageModel;
use syntopical_core::models::{
    Chunk, Document, DocumentSummary, Message, PaperMetadata, RetrievalResult, Role,
};
use syntopical_core::retrieve::Retriever;
use syntopical_core::session::{AnalysisSession, SessionState};
use syntopical_core::store::memory::InMemoryStore;
use syntopical_core::store::{Scope, VectorStore};
use syntopical_core::{Error, Result};

// ============ Fixtures ============

const DIMS: usize = 384;

const VOCAB_A: &[&str] = &[
    "transformer", "attention", "layers", "encode", "token", "sequences", "with", "learned",
    "query", "key", "value", "projections", "across", "many", "heads",
];

const VOCAB_B: &[&str] = &[
    "coral", "reefs", "bleach", "when", "ocean", "temperatures", "rise", "above", "seasonal",
    "maxima",
];

/// `n` words drawn cyclically from `vocab`, ten words per sentence.
fn words(vocab: &[&str], n: usize) -> String {
    let mut out = String::new();
    for i in 0..n {
        if i > 0 {
            out.push_str(if i % 10 == 0 { ". " } else { " " });
        }
        out.push_str(vocab[i % vocab.len()]);
    }
    out.push('.');
    out
}

fn paper(title: &str, text: &str) -> Document {
    Document::new(
        title,
        format!("mem://{}", title.to_lowercase().replace(' ', "-")),
        text,
        PaperMetadata::default(),
    )
}

fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(DIMS))
}

struct Corpus {
    store: Arc<InMemoryStore>,
    indexer: Indexer,
}

fn corpus(params: ChunkParams) -> Corpus {
    let store = Arc::new(InMemoryStore::new());
    let indexer = Indexer::new(store.clone(), embedder(), params);
    Corpus { store, indexer }
}

impl Corpus {
    fn retriever(&self) -> Retriever {
        Retriever::new(self.store.clone(), embedder())
    }

    fn analyst(&self, llm: Arc<dyn LanguageModel>, config: AnalysisConfig) -> Analyst {
        Analyst::new(self.retriever(), llm, config)
    }
}

fn scope_of(ids: &[&str]) -> Scope {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Records every call and answers with a numbered reply.
#[derive(Default)]
struct RecordingModel {
    calls: Mutex<Vec<(Vec<Message>, AssembledContext)>>,
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, messages: &[Message], context: &AssembledContext) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((messages.to_vec(), context.clone()));
        Ok(format!("answer {}", calls.len()))
    }
}

struct FailingModel {
    error: Error,
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _: &[Message], _: &AssembledContext) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Never completes.
struct StalledModel;

#[async_trait]
impl LanguageModel for StalledModel {
    fn model_name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _: &[Message], _: &AssembledContext) -> Result<String> {
        futures::future::pending::<Result<String>>().await
    }
}

/// Fails the first `failures` calls, either with a transient error or by
/// returning one vector too few.
struct FlakyEmbedder {
    inner: HashingEmbedder,
    failures: AtomicUsize,
    short_batch: bool,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    fn new(failures: usize, short_batch: bool) -> Self {
        Self {
            inner: HashingEmbedder::new(DIMS),
            failures: AtomicUsize::new(failures),
            short_batch,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let mut vectors = self.inner.embed(texts).await?;
        if failing {
            if !self.short_batch {
                return Err(Error::embedding("connection reset", true));
            }
            vectors.pop();
        }
        Ok(vectors)
    }
}

/// A store whose backend is unreachable.
struct UnreachableStore;

fn outage() -> Error {
    Error::store("connection refused", true)
}

#[async_trait]
impl VectorStore for UnreachableStore {
    async fn replace_document(&self, _: &Document, _: &[Chunk], _: &[Vec<f32>]) -> Result<()> {
        Err(outage())
    }
    async fn delete_document(&self, _: &str) -> Result<bool> {
        Err(outage())
    }
    async fn get_document(&self, _: &str) -> Result<Option<Document>> {
        Err(outage())
    }
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        Err(outage())
    }
    async fn document_ids(&self, _: Option<&Scope>) -> Result<Vec<String>> {
        Err(outage())
    }
    async fn count_chunks(&self, _: Option<&Scope>) -> Result<usize> {
        Err(outage())
    }
    async fn chunks_for(&self, _: &str) -> Result<Vec<Chunk>> {
        Err(outage())
    }
    async fn query(&self, _: &[f32], _: usize, _: Option<&Scope>) -> Result<Vec<RetrievalResult>> {
        Err(outage())
    }
}

const SHORT_PAPERS: &[(&str, &str)] = &[
    (
        "Sparse Attention",
        "Sparse attention reduces the memory cost of long sequence transformers in practice.",
    ),
    (
        "Linear Attention",
        "Linear attention approximates softmax attention with kernel features for long inputs.",
    ),
    (
        "Attention Sinks",
        "Attention sinks stabilise streaming inference when generating very long sequences.",
    ),
];

async fn index_short_papers(c: &Corpus) -> Vec<Document> {
    let docs: Vec<Document> = SHORT_PAPERS.iter().map(|(t, x)| paper(t, x)).collect();
    for d in &docs {
        c.indexer.index(d).await.unwrap();
    }
    docs
}

// ============ Chunking ============

#[test]
fn chunking_is_deterministic() {
    let text = words(VOCAB_A, 800);
    let params = ChunkParams::new(200, 40);
    assert_eq!(chunk_text("a", &text, &params), chunk_text("a", &text, &params));
}

#[test]
fn chunks_cover_text_without_gaps() {
    let text = words(VOCAB_A, 800);
    let params = ChunkParams::new(200, 40);
    let chunks = chunk_text("a", &text, &params);

    assert_eq!(chunks.first().unwrap().start_offset, 0);
    assert_eq!(chunks.last().unwrap().end_offset, text.len());
    for pair in chunks.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert!(next.start_offset > prev.start_offset);
        assert!(next.start_offset <= prev.end_offset, "gap between chunks");
        assert!(prev.end_offset - next.start_offset <= 40 * CHARS_PER_TOKEN);
    }
    for c in &chunks {
        assert!(c.end_offset > c.start_offset);
        assert!(estimate_tokens(&c.text) <= 200);
        assert_eq!(&text[c.start_offset..c.end_offset], c.text);
    }
}

// ============ Scenario: A (800 words) and B (50 words) ============

#[tokio::test]
async fn scoped_query_returns_only_scoped_document() {
    let c = corpus(ChunkParams::new(200, 40));
    let a = paper("A", &words(VOCAB_A, 800));
    let b = paper("B", &words(VOCAB_B, 50));

    let ra = c.indexer.index(&a).await.unwrap();
    let rb = c.indexer.index(&b).await.unwrap();
    assert!(ra.chunks_indexed >= 4, "A produced {} chunks", ra.chunks_indexed);
    assert_eq!(rb.chunks_indexed, 1);

    // The query matches A's vocabulary; unscoped, A wins.
    let retriever = c.retriever();
    let query = "transformer attention heads with learned projections";
    let global = retriever.retrieve(query, 3, None).await.unwrap();
    assert!(global.iter().all(|r| r.document_id == a.id));

    let scope = scope_of(&[&b.id]);
    let scoped = retriever.retrieve(query, 10, Some(&scope)).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].document_id, b.id);
    assert_eq!(scoped[0].document_title, "B");
}

// ============ Indexing ============

#[tokio::test]
async fn reindexing_replaces_previous_chunks() {
    let c = corpus(ChunkParams::new(200, 40));
    let v1 = paper("Evolving", &words(VOCAB_A, 800));
    let expected = chunk_text(&v1.id, &v1.full_text, &ChunkParams::new(200, 40)).len();

    c.indexer.index(&v1).await.unwrap();
    c.indexer.index(&v1).await.unwrap();
    assert_eq!(c.store.count_chunks(None).await.unwrap(), expected);

    // Same source, shorter text: the old tail must not survive.
    let v2 = paper("Evolving", &words(VOCAB_A, 300));
    assert_eq!(v1.id, v2.id);
    let result = c.indexer.index(&v2).await.unwrap();
    assert!(result.chunks_indexed < expected);

    let stored = c.store.chunks_for(&v2.id).await.unwrap();
    assert_eq!(stored.len(), result.chunks_indexed);
    assert_eq!(c.store.count_chunks(None).await.unwrap(), result.chunks_indexed);
    let mut ranges: Vec<(usize, usize)> =
        stored.iter().map(|ch| (ch.start_offset, ch.end_offset)).collect();
    ranges.dedup();
    assert_eq!(ranges.len(), stored.len());
    assert!(stored.iter().all(|ch| ch.id.starts_with(&format!("{}:", v2.id))));
}

#[tokio::test]
async fn transient_embedding_failure_is_retried_once() {
    let store = Arc::new(InMemoryStore::new());
    let flaky = Arc::new(FlakyEmbedder::new(1, false));
    let indexer = Indexer::new(store.clone(), flaky.clone(), ChunkParams::new(200, 40));

    let doc = paper("Retried", &words(VOCAB_B, 50));
    indexer.index(&doc).await.unwrap();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.count_chunks(None).await.unwrap(), 1);
}

#[tokio::test]
async fn persistent_embedding_failure_leaves_no_document() {
    let store = Arc::new(InMemoryStore::new());
    let flaky = Arc::new(FlakyEmbedder::new(usize::MAX, false));
    let indexer = Indexer::new(store.clone(), flaky.clone(), ChunkParams::new(200, 40));

    let doc = paper("Down", &words(VOCAB_B, 50));
    let err = indexer.index(&doc).await.unwrap_err();
    assert!(matches!(err, Error::Embedding { transient: true, .. }));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    assert!(store.get_document(&doc.id).await.unwrap().is_none());
    assert_eq!(store.count_chunks(None).await.unwrap(), 0);
}

#[tokio::test]
async fn partial_batch_failure_keeps_previous_version() {
    let c = corpus(ChunkParams::new(50, 10));
    let v1 = paper("Stable", &words(VOCAB_A, 120));
    c.indexer.index(&v1).await.unwrap();
    let before = c.store.chunks_for(&v1.id).await.unwrap();

    let short = Arc::new(FlakyEmbedder::new(usize::MAX, true));
    let broken = Indexer::new(c.store.clone(), short, ChunkParams::new(50, 10)).with_batch_size(4);
    let v2 = paper("Stable", &words(VOCAB_B, 120));
    let err = broken.index(&v2).await.unwrap_err();
    assert!(matches!(err, Error::Embedding { .. }));

    assert_eq!(c.store.chunks_for(&v1.id).await.unwrap(), before);
    let stored = c.store.get_document(&v1.id).await.unwrap().unwrap();
    assert_eq!(stored.full_text, v1.full_text);
}

#[tokio::test]
async fn remove_cascades_to_chunks() {
    let c = corpus(ChunkParams::new(200, 40));
    let docs = index_short_papers(&c).await;
    assert!(c.indexer.remove(&docs[0].id).await.unwrap());
    assert!(!c.indexer.remove(&docs[0].id).await.unwrap());
    assert_eq!(c.store.count_chunks(None).await.unwrap(), docs.len() - 1);
    assert!(c.store.chunks_for(&docs[0].id).await.unwrap().is_empty());
}

// ============ Retrieval ============

#[tokio::test]
async fn retrieval_is_deterministic_with_ties() {
    let c = corpus(ChunkParams::new(200, 40));
    let text = "Graph neural networks learn representations of molecules.";
    let first = paper("Copy One", text);
    let second = paper("Copy Two", text);
    c.indexer.index(&first).await.unwrap();
    c.indexer.index(&second).await.unwrap();

    let retriever = c.retriever();
    let run1 = retriever.retrieve("graph networks", 5, None).await.unwrap();
    let run2 = retriever.retrieve("graph networks", 5, None).await.unwrap();
    assert_eq!(run1, run2);
    assert_eq!(run1.len(), 2);
    assert_eq!(run1[0].score, run1[1].score);
    assert!(run1[0].document_id < run1[1].document_id);
}

#[tokio::test]
async fn fewer_chunks_than_k_returns_all() {
    let c = corpus(ChunkParams::new(200, 40));
    index_short_papers(&c).await;
    let results = c.retriever().retrieve("attention", 50, None).await.unwrap();
    assert_eq!(results.len(), SHORT_PAPERS.len());
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn blank_query_or_zero_k_is_empty() {
    let c = corpus(ChunkParams::new(200, 40));
    index_short_papers(&c).await;
    let retriever = c.retriever();
    assert!(retriever.retrieve("   ", 5, None).await.unwrap().is_empty());
    assert!(retriever.retrieve("attention", 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_corpus_is_distinct_from_outage() {
    let empty = Retriever::new(Arc::new(InMemoryStore::new()), embedder());
    let err = empty.retrieve("anything", 5, None).await.unwrap_err();
    assert!(err.is_empty_corpus());

    let down = Retriever::new(Arc::new(UnreachableStore), embedder());
    let err = down.retrieve("anything", 5, None).await.unwrap_err();
    assert!(!err.is_empty_corpus());
    assert_eq!(err, outage());
    assert!(err.is_transient());
}

#[tokio::test]
async fn scope_without_chunks_is_empty_corpus() {
    let c = corpus(ChunkParams::new(200, 40));
    index_short_papers(&c).await;
    let scope = scope_of(&["not-a-document"]);
    let err = c
        .retriever()
        .retrieve("attention", 5, Some(&scope))
        .await
        .unwrap_err();
    assert!(err.is_empty_corpus());
}

// ============ Assembly ============

#[tokio::test]
async fn assembled_context_respects_budget() {
    let c = corpus(ChunkParams::new(200, 40));
    c.indexer.index(&paper("A", &words(VOCAB_A, 800))).await.unwrap();
    c.indexer.index(&paper("B", &words(VOCAB_B, 50))).await.unwrap();
    let results = c.retriever().retrieve("attention heads", 20, None).await.unwrap();
    let smallest = results.iter().map(|r| estimate_tokens(&r.text)).min().unwrap();

    for budget in [smallest, smallest + 1, 2 * smallest, 500, 3000] {
        let ctx = assemble(
            &results,
            &AssemblyOptions {
                token_budget: budget,
                cover_documents: false,
            },
        )
        .unwrap();
        assert!(!ctx.is_empty());
        assert!(ctx.total_tokens <= budget, "{} > {}", ctx.total_tokens, budget);
    }

    let err = assemble(
        &results,
        &AssemblyOptions {
            token_budget: smallest - 1,
            cover_documents: false,
        },
    )
    .unwrap_err();
    assert_eq!(
        err,
        Error::BudgetExceeded {
            budget: smallest - 1,
            smallest_chunk_tokens: smallest
        }
    );
}

// ============ Analysis ============

#[tokio::test]
async fn analysis_backfills_to_minimum_coverage() {
    let c = corpus(ChunkParams::new(25, 5));
    let dominant = paper(
        "Quantum Codes",
        &"Quantum error correction protects fragile logical qubits from noise. ".repeat(8),
    );
    let others = [
        paper("Trade", "Medieval trade routes shaped the growth of river cities."),
        paper("Soil", "Soil microbes regulate nitrogen cycling in temperate forests."),
        paper("Rivers", "Braided rivers migrate during seasonal floods across gravel plains."),
        paper("Markets", "Central banks influence inflation expectations through guidance."),
    ];
    let r = c.indexer.index(&dominant).await.unwrap();
    assert!(r.chunks_indexed >= 3);
    for d in &others {
        c.indexer.index(d).await.unwrap();
    }

    let topic = "quantum error correction logical qubits";
    let top = c.retriever().retrieve(topic, 3, None).await.unwrap();
    assert!(top.iter().all(|r| r.document_id == dominant.id));

    let model = Arc::new(RecordingModel::default());
    let analyst = c.analyst(
        model.clone(),
        AnalysisConfig {
            top_k: 3,
            token_budget: 3000,
            min_documents: 3,
        },
    );
    let mut session = AnalysisSession::new(None);
    let answer = analyst.analyze(&mut session, topic).await.unwrap();

    let cited: std::collections::BTreeSet<&str> =
        answer.sources.iter().map(|s| s.document_id.as_str()).collect();
    assert!(cited.len() >= 3, "only {} documents in context", cited.len());
    assert!(cited.contains(dominant.id.as_str()));
    assert_eq!(answer.documents_retrieved, 5);

    let calls = model.calls.lock().unwrap();
    let (messages, _) = &calls[0];
    assert!(messages.last().unwrap().content.contains("6. Synthesis"));
}

#[tokio::test]
async fn citations_match_assembled_context() {
    let c = corpus(ChunkParams::new(100, 20));
    index_short_papers(&c).await;
    let model = Arc::new(RecordingModel::default());
    // Each paper is one ~21-token chunk: room for exactly one.
    let analyst = c.analyst(
        model.clone(),
        AnalysisConfig {
            top_k: 8,
            token_budget: 30,
            min_documents: 3,
        },
    );

    let mut session = AnalysisSession::new(None);
    let answer = analyst
        .chat(&mut session, "attention for long sequences")
        .await
        .unwrap();
    assert_eq!(answer.documents_retrieved, 3);
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_id, answer.context.passages[0].document_id);
    assert!(answer.context_tokens <= 30);

    let calls = model.calls.lock().unwrap();
    let (messages, context) = &calls[0];
    assert_eq!(context, &answer.context);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].content.contains(&answer.sources[0].title));
    for (title, _) in SHORT_PAPERS {
        if *title != answer.sources[0].title {
            assert!(!messages[0].content.contains(title));
        }
    }
}

#[tokio::test]
async fn chat_carries_history_to_the_model() {
    let c = corpus(ChunkParams::new(100, 20));
    index_short_papers(&c).await;
    let model = Arc::new(RecordingModel::default());
    let analyst = c.analyst(model.clone(), AnalysisConfig::default());
    let mut session = AnalysisSession::new(None);

    analyst.chat(&mut session, "What is sparse attention?").await.unwrap();
    analyst.chat(&mut session, "And linear attention?").await.unwrap();
    assert_eq!(session.history().len(), 4);
    assert_eq!(session.history()[0], Message::user("What is sparse attention?"));
    assert_eq!(session.history()[1], Message::assistant("answer 1"));

    let calls = model.calls.lock().unwrap();
    let (second, _) = &calls[1];
    let roles: Vec<Role> = second.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert!(second[3].content.contains("And linear attention?"));
    drop(calls);

    session.reset().unwrap();
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn scoped_session_only_cites_scope() {
    let c = corpus(ChunkParams::new(100, 20));
    let docs = index_short_papers(&c).await;
    let model = Arc::new(RecordingModel::default());
    let analyst = c.analyst(model, AnalysisConfig::default());

    let mut session = AnalysisSession::new(Some(scope_of(&[&docs[1].id])));
    let answer = analyst.analyze(&mut session, "long sequences").await.unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_id, docs[1].id);
}

#[tokio::test]
async fn generation_error_surfaces_unchanged() {
    let c = corpus(ChunkParams::new(100, 20));
    index_short_papers(&c).await;
    let model = Arc::new(FailingModel {
        error: Error::generation("rate limited", true),
        calls: AtomicUsize::new(0),
    });
    let analyst = c.analyst(model.clone(), AnalysisConfig::default());
    let mut session = AnalysisSession::new(None);

    let err = analyst.chat(&mut session, "attention").await.unwrap_err();
    assert_eq!(err, Error::generation("rate limited", true));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn empty_corpus_analysis_leaves_session_idle() {
    let c = corpus(ChunkParams::new(100, 20));
    let analyst = c.analyst(Arc::new(RecordingModel::default()), AnalysisConfig::default());
    let mut session = AnalysisSession::new(None);

    let err = analyst.analyze(&mut session, "anything").await.unwrap_err();
    assert!(err.is_empty_corpus());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn abandoned_generation_leaves_session_busy() {
    let c = corpus(ChunkParams::new(100, 20));
    index_short_papers(&c).await;
    let analyst = c.analyst(Arc::new(StalledModel), AnalysisConfig::default());
    let mut session = AnalysisSession::new(None);

    assert!(analyst.chat(&mut session, "attention").now_or_never().is_none());
    assert_eq!(session.state(), SessionState::Generating);
    assert!(session.history().is_empty());

    let err = analyst.chat(&mut session, "again").await.unwrap_err();
    assert_eq!(err, Error::SessionBusy(SessionState::Generating));

    session.close();
    let err = analyst.chat(&mut session, "again").await.unwrap_err();
    assert_eq!(err, Error::SessionClosed);
}
