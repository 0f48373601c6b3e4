//! Prompt templates for chat and topic analysis.

use crate::assemble::AssembledContext;

const SYSTEM_PREAMBLE: &str = "You are a research assistant performing syntopical analysis: \
reading several academic papers side by side and synthesizing what they say about a question. \
Answer only from the numbered excerpts below. When you use an excerpt, cite the paper by its title. \
If the excerpts do not contain the answer, say so instead of guessing.";

/// System message carrying the assembled context.
pub fn system_prompt(context: &AssembledContext) -> String {
    format!(
        "{SYSTEM_PREAMBLE}\n\nExcerpts:\n\n{}",
        context.render()
    )
}

/// Frame a chat question as a cross-paper comparison.
pub fn enhance_query(question: &str) -> String {
    format!(
        "Answer the following by comparing what the papers say: {question}\n\
         Weigh the perspectives, methods and findings of every relevant paper. \
         Point out where they agree, where they disagree and where they complement each other. \
         Cite specific papers when referring to their content."
    )
}

/// Structured prompt for a full syntopical analysis of `topic`.
pub fn analysis_prompt(topic: &str) -> String {
    format!(
        "Write a syntopical analysis of the topic: '{topic}'\n\n\
         Structure it as:\n\
         1. Overview of the topic and why it matters\n\
         2. Key perspectives and approaches across the papers\n\
         3. Main points of agreement\n\
         4. Notable disagreements or contradictions\n\
         5. Gaps in the literature and directions for future work\n\
         6. Synthesis of the most important insights\n\n\
         For each point, cite the papers it draws on and explain what each contributes."
    )
}
