//! Conversational commands: `chat` (interactive) and `analyze` (one shot).
//!
//! Inside `chat`:
//!
//! | Input | Effect |
//! |-------|--------|
//! | `exit`, `quit` | end the session |
//! | `/reset` | clear conversation history |
//! | `/analyze <topic>` | run a structured analysis within the session |
//! | anything else | ask a question |
//!
//! The prompt is only printed when stdin is a terminal, so piped input
//! produces answers only.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use syntopical_core::analysis::{Analyst, Answer};
use syntopical_core::session::AnalysisSession;

use crate::app::{empty_corpus_message, App};
use crate::config::Config;

/// Printed on stderr when `chat` starts without a language model.
pub const NO_MODEL_HINT: &str = "The language model is disabled ([llm] provider = \"disabled\"), \
so questions cannot be answered. `syntopical search` retrieves passages without one.";

/// One parsed line of chat input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    Reset,
    Analyze(&'a str),
    Question(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "exit" | "quit" => Input::Exit,
        "/reset" => Input::Reset,
        _ => match line.strip_prefix("/analyze") {
            Some(topic) => Input::Analyze(topic.trim()),
            None => Input::Question(line),
        },
    }
}

pub fn print_answer(answer: &Answer) {
    println!("{}", answer.text.trim());
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, source.title, source.document_id);
        }
    }
    tracing::debug!(
        context_tokens = answer.context_tokens,
        documents_retrieved = answer.documents_retrieved,
        "answer"
    );
}

/// Print a turn's result. Returns the error if it is not an empty corpus.
fn report_turn(result: syntopical_core::Result<Answer>, scoped: bool) -> Option<syntopical_core::Error> {
    match result {
        Ok(answer) => {
            print_answer(&answer);
            None
        }
        Err(e) => match empty_corpus_message(&e, scoped) {
            Some(hint) => {
                println!("{}", hint);
                None
            }
            None => Some(e),
        },
    }
}

pub async fn run_chat(config: &Config, papers: &[String]) -> Result<()> {
    let app = App::open(config).await?;
    let scope = app.resolve_scope(papers).await?;
    let scoped = scope.is_some();
    let analyst = app.analyst()?;
    let mut session = AnalysisSession::new(scope);

    if !config.llm.is_enabled() {
        eprintln!("warning: {}", NO_MODEL_HINT);
    }
    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!("Ask a question about your papers. `/reset` clears history, `exit` quits.");
    }
    chat_loop(&analyst, &mut session, interactive, scoped).await?;

    session.close();
    app.close().await;
    Ok(())
}

async fn chat_loop(
    analyst: &Analyst,
    session: &mut AnalysisSession,
    interactive: bool,
    scoped: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let result = match parse_input(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::Reset => {
                session.reset()?;
                println!("History cleared.");
                continue;
            }
            Input::Analyze(topic) => analyst.analyze(session, topic).await,
            Input::Question(question) => analyst.chat(session, question).await,
        };
        if let Some(e) = report_turn(result, scoped) {
            eprintln!("error: {}", e);
        }
        println!();
    }
    Ok(())
}

pub async fn run_analyze(config: &Config, topic: &str, papers: &[String], json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let scope = app.resolve_scope(papers).await?;
    let scoped = scope.is_some();
    let analyst = app.analyst()?;
    let mut session = AnalysisSession::new(scope);

    let result = analyst.analyze(&mut session, topic).await;
    session.close();
    app.close().await;

    if json {
        let answer = match result {
            Ok(answer) => answer,
            Err(e) => match empty_corpus_message(&e, scoped) {
                Some(hint) => {
                    println!("{}", hint);
                    return Ok(());
                }
                None => return Err(e.into()),
            },
        };
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }
    match report_turn(result, scoped) {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
