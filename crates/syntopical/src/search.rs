//! `syntopical search`: retrieval without generation.
//!
//! Prints the top-k chunks for a query with their cosine scores, in the same
//! order the chat and analysis commands would see them.

use anyhow::Result;

use syntopical_core::models::RetrievalResult;

use crate::app::{empty_corpus_message, App};
use crate::config::Config;

const EXCERPT_BYTES: usize = 240;

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    papers: &[String],
) -> Result<()> {
    let app = App::open(config).await?;
    let scope = app.resolve_scope(papers).await?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let results = match app.retriever().retrieve(query, k, scope.as_ref()).await {
        Ok(results) => results,
        Err(e) => {
            app.close().await;
            if let Some(hint) = empty_corpus_message(&e, scope.is_some()) {
                println!("{}", hint);
                return Ok(());
            }
            return Err(e.into());
        }
    };
    app.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }
    Ok(())
}

fn print_result(rank: usize, result: &RetrievalResult) {
    println!("{}. [{:.3}] {}", rank, result.score, result.document_title);
    println!(
        "    chunk: {} (bytes {}..{})",
        result.chunk_index, result.start_offset, result.end_offset
    );
    println!("    excerpt: \"{}\"", excerpt(&result.text));
    println!("    id: {}", result.document_id);
    println!();
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= EXCERPT_BYTES {
        return flat;
    }
    let mut end = EXCERPT_BYTES;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &flat[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n\n b\tc"), "a b c");
        let long = "é".repeat(200);
        let cut = excerpt(&long);
        assert!(cut.ends_with('…'));
        assert!(cut.len() <= EXCERPT_BYTES + '…'.len_utf8());
    }
}
