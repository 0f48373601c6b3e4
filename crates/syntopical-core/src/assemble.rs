//! Context assembly under a token budget.
//!
//! Turns ranked [`RetrievalResult`]s into the passages handed to the
//! language model:
//!
//! 1. Candidates are ordered by [`rank_order`] and duplicate chunk ids dropped.
//! 2. With `cover_documents`, each document's best chunk is admitted first,
//!    in score order.
//! 3. Remaining candidates are admitted in score order.
//!
//! A candidate is admitted only if the whole context still fits the budget
//! afterwards; otherwise it is skipped and later (smaller) candidates are
//! still considered. Chunks are never split. Selected chunks of one document
//! whose ranges overlap or touch are merged into a single passage before
//! tokens are counted, so overlap windows are paid for once.
//!
//! Tokens are estimated with [`estimate_tokens`].

use std::collections::HashSet;

use serde::Serialize;

use crate::chunk::estimate_tokens;
use crate::error::{Error, Result};
use crate::models::RetrievalResult;
use crate::retrieve::rank_order;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyOptions {
    pub token_budget: usize,
    /// Admit one chunk from every candidate document before filling by score.
    pub cover_documents: bool,
}

/// A contiguous span of one document included in the context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPassage {
    pub document_id: String,
    pub document_title: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Best score among the merged chunks.
    pub score: f64,
    /// Merged chunk ids, by offset.
    pub chunk_ids: Vec<String>,
}

/// A document cited by an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub document_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    /// Ordered by best score, descending.
    pub passages: Vec<ContextPassage>,
    pub total_tokens: usize,
    pub budget: usize,
}

impl AssembledContext {
    pub fn empty(budget: usize) -> Self {
        Self {
            passages: Vec::new(),
            total_tokens: 0,
            budget,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Distinct documents with at least one passage, in passage order.
    pub fn sources(&self) -> Vec<SourceRef> {
        let mut seen = HashSet::new();
        self.passages
            .iter()
            .filter(|p| seen.insert(p.document_id.as_str()))
            .map(|p| SourceRef {
                document_id: p.document_id.clone(),
                title: p.document_title.clone(),
            })
            .collect()
    }

    /// Numbered, titled context block for prompts.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, p) in self.passages.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            out.push_str(&format!("[{}] {}\n{}", i + 1, p.document_title, p.text.trim()));
        }
        out
    }
}

/// See the [module documentation](self).
///
/// # Errors
///
/// [`Error::BudgetExceeded`] when `results` is non-empty but no single chunk
/// fits within the budget. Empty `results` yield an empty context.
pub fn assemble(results: &[RetrievalResult], options: &AssemblyOptions) -> Result<AssembledContext> {
    let mut candidates: Vec<&RetrievalResult> = results.iter().collect();
    candidates.sort_by(|a, b| rank_order(a, b));
    let mut seen_ids = HashSet::new();
    candidates.retain(|c| seen_ids.insert(c.chunk_id.as_str()));

    if candidates.is_empty() {
        return Ok(AssembledContext::empty(options.token_budget));
    }

    let mut selected: Vec<&RetrievalResult> = Vec::new();
    let mut taken = vec![false; candidates.len()];

    if options.cover_documents {
        let mut covered = HashSet::new();
        for (i, cand) in candidates.iter().enumerate() {
            if !covered.insert(cand.document_id.as_str()) {
                continue;
            }
            taken[i] = try_admit(&mut selected, cand, options.token_budget);
        }
    }

    for (i, cand) in candidates.iter().enumerate() {
        if !taken[i] {
            taken[i] = try_admit(&mut selected, cand, options.token_budget);
        }
    }

    if selected.is_empty() {
        let smallest_chunk_tokens = candidates
            .iter()
            .map(|c| estimate_tokens(&c.text))
            .min()
            .unwrap_or(0);
        return Err(Error::BudgetExceeded {
            budget: options.token_budget,
            smallest_chunk_tokens,
        });
    }

    let passages = merge_passages(&selected);
    let total_tokens = passage_tokens(&passages);
    tracing::debug!(
        candidates = candidates.len(),
        selected = selected.len(),
        passages = passages.len(),
        total_tokens,
        budget = options.token_budget,
        "assembled context"
    );
    Ok(AssembledContext {
        passages,
        total_tokens,
        budget: options.token_budget,
    })
}

fn try_admit<'a>(
    selected: &mut Vec<&'a RetrievalResult>,
    cand: &'a RetrievalResult,
    budget: usize,
) -> bool {
    selected.push(cand);
    if passage_tokens(&merge_passages(selected)) <= budget {
        true
    } else {
        selected.pop();
        false
    }
}

fn passage_tokens(passages: &[ContextPassage]) -> usize {
    passages.iter().map(|p| estimate_tokens(&p.text)).sum()
}

/// Merge same-document chunks whose ranges overlap or touch.
fn merge_passages(selected: &[&RetrievalResult]) -> Vec<ContextPassage> {
    let mut by_position: Vec<&RetrievalResult> = selected.to_vec();
    by_position.sort_by(|a, b| {
        a.document_id
            .cmp(&b.document_id)
            .then_with(|| a.start_offset.cmp(&b.start_offset))
            .then_with(|| a.end_offset.cmp(&b.end_offset))
    });

    let mut passages: Vec<ContextPassage> = Vec::new();
    for r in by_position {
        match passages.last_mut() {
            Some(p) if p.document_id == r.document_id && r.start_offset <= p.end_offset => {
                if r.end_offset > p.end_offset {
                    let skip = p.end_offset - r.start_offset;
                    p.text.push_str(r.text.get(skip..).unwrap_or_default());
                    p.end_offset = r.end_offset;
                }
                p.score = p.score.max(r.score);
                p.chunk_ids.push(r.chunk_id.clone());
            }
            _ => passages.push(ContextPassage {
                document_id: r.document_id.clone(),
                document_title: r.document_title.clone(),
                text: r.text.clone(),
                start_offset: r.start_offset,
                end_offset: r.end_offset,
                score: r.score,
                chunk_ids: vec![r.chunk_id.clone()],
            }),
        }
    }

    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.start_offset.cmp(&b.start_offset))
    });
    passages
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii jjjj";

    fn hit(doc: &str, idx: usize, start: usize, end: usize, score: f64) -> RetrievalResult {
        RetrievalResult {
            chunk_id: format!("{doc}:{idx:05}"),
            document_id: doc.to_string(),
            document_title: format!("Title {doc}"),
            chunk_index: idx,
            start_offset: start,
            end_offset: end,
            score,
            text: TEXT[start..end].to_string(),
        }
    }

    fn opts(budget: usize) -> AssemblyOptions {
        AssemblyOptions {
            token_budget: budget,
            cover_documents: false,
        }
    }

    #[test]
    fn test_empty_input_is_empty_context() {
        let ctx = assemble(&[], &opts(10)).unwrap();
        assert!(ctx.is_empty());
        assert_eq!(ctx.total_tokens, 0);
    }

    #[test]
    fn test_overlapping_chunks_merge_once() {
        // [0,14) and [10,24) overlap on "cccc".
        let results = vec![hit("a", 0, 0, 14, 0.9), hit("a", 1, 10, 24, 0.8)];
        let ctx = assemble(&results, &opts(100)).unwrap();
        assert_eq!(ctx.passages.len(), 1);
        let p = &ctx.passages[0];
        assert_eq!(p.text, &TEXT[0..24]);
        assert_eq!((p.start_offset, p.end_offset), (0, 24));
        assert_eq!(p.chunk_ids.len(), 2);
        assert_eq!(ctx.total_tokens, estimate_tokens(&TEXT[0..24]));
    }

    #[test]
    fn test_touching_chunks_merge_and_distant_ones_do_not() {
        let results = vec![
            hit("a", 0, 0, 10, 0.9),
            hit("a", 1, 10, 20, 0.5),
            hit("a", 3, 30, 40, 0.7),
        ];
        let ctx = assemble(&results, &opts(100)).unwrap();
        assert_eq!(ctx.passages.len(), 2);
        assert_eq!(ctx.passages[0].text, &TEXT[0..20]);
        assert_eq!(ctx.passages[1].text, &TEXT[30..40]);
    }

    #[test]
    fn test_budget_skips_large_chunk_and_keeps_smaller() {
        // 0.9 chunk is 40 bytes (10 tokens); 0.5 chunk is 4 bytes (1 token).
        let results = vec![hit("a", 0, 0, 40, 0.9), hit("b", 0, 0, 4, 0.5)];
        let ctx = assemble(&results, &opts(5)).unwrap();
        assert_eq!(ctx.sources().len(), 1);
        assert_eq!(ctx.sources()[0].document_id, "b");
        assert!(ctx.total_tokens <= 5);
    }

    #[test]
    fn test_budget_exceeded_when_nothing_fits() {
        let results = vec![hit("a", 0, 0, 40, 0.9), hit("b", 0, 0, 20, 0.5)];
        let err = assemble(&results, &opts(4)).unwrap_err();
        assert_eq!(
            err,
            Error::BudgetExceeded {
                budget: 4,
                smallest_chunk_tokens: 5
            }
        );
    }

    #[test]
    fn test_cover_documents_admits_each_document_first() {
        let results = vec![
            hit("a", 0, 0, 20, 0.95),
            hit("a", 2, 25, 45, 0.9),
            hit("b", 0, 0, 20, 0.3),
        ];
        // Budget for two 5-token chunks.
        let plain = assemble(&results, &opts(10)).unwrap();
        assert_eq!(plain.sources().len(), 1);

        let covering = assemble(
            &results,
            &AssemblyOptions {
                token_budget: 10,
                cover_documents: true,
            },
        )
        .unwrap();
        let ids: Vec<String> = covering.sources().into_iter().map(|s| s.document_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_chunk_ids_dropped() {
        let results = vec![hit("a", 0, 0, 10, 0.9), hit("a", 0, 0, 10, 0.9)];
        let ctx = assemble(&results, &opts(100)).unwrap();
        assert_eq!(ctx.passages[0].chunk_ids.len(), 1);
    }

    #[test]
    fn test_render_numbers_and_titles_passages() {
        let results = vec![hit("a", 0, 0, 4, 0.9), hit("b", 0, 5, 9, 0.5)];
        let ctx = assemble(&results, &opts(100)).unwrap();
        assert_eq!(ctx.render(), "[1] Title a\naaaa\n\n[2] Title b\nbbbb");
    }
}
