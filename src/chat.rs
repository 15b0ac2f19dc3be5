//! The `ask` and `chat` commands.
//!
//! `ask` answers one question and exits. `chat` runs an interactive loop:
//!
//! | Input | Effect |
//! |-------|--------|
//! | `quit`, `exit`, `bye` | end the session (any case) |
//! | `clear` | forget the conversation history |
//! | `help` | list sample questions |
//! | empty line | ignored |
//! | anything else | answered from the knowledge base |
//!
//! A failed turn prints the error and the loop keeps going.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::assistant::{Answer, Assistant, Session, SAMPLE_QUESTIONS};
use crate::config::Config;

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Quit,
    Clear,
    Help,
    Empty,
    Ask(&'a str),
}

fn parse_command(line: &str) -> ReplCommand<'_> {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => ReplCommand::Empty,
        "quit" | "exit" | "bye" => ReplCommand::Quit,
        "clear" => ReplCommand::Clear,
        "help" => ReplCommand::Help,
        _ => ReplCommand::Ask(trimmed),
    }
}

pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let assistant = Assistant::from_config(config.clone())?;
    assistant.ensure_initialized().await?;

    let mut session = Session::new();
    let answer = assistant.answer(&mut session, question).await?;
    let mut stdout = std::io::stdout();
    print_answer(&mut stdout, &answer)?;
    Ok(())
}

pub async fn run_chat(config: &Config) -> Result<()> {
    let assistant = Assistant::from_config(config.clone())?;
    assistant.ensure_initialized().await?;

    let stats = assistant.knowledge_base().stats().await;
    let model = assistant.model_info();
    println!("FIT-FLIX Assistant");
    println!("==================");
    println!(
        "  {} records indexed, answering with {}",
        stats.document_count, model.model_name
    );
    println!("  Type 'help' for sample questions, 'quit' to exit.");
    println!();

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    repl(&assistant, stdin, &mut stdout).await
}

async fn repl<R, W>(assistant: &Assistant, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = Session::new();
    let mut lines = input.lines();

    loop {
        write!(out, "You: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };

        match parse_command(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => {
                writeln!(out, "Goodbye! Keep moving.")?;
                break;
            }
            ReplCommand::Clear => {
                session.clear();
                writeln!(out, "Conversation cleared.")?;
            }
            ReplCommand::Help => {
                writeln!(out, "Try asking:")?;
                for question in SAMPLE_QUESTIONS {
                    writeln!(out, "  - {}", question)?;
                }
            }
            ReplCommand::Ask(question) => match assistant.answer(&mut session, question).await {
                Ok(answer) => print_answer(out, &answer)?,
                Err(e) => {
                    tracing::error!("Chat turn failed: {:#}", e);
                    writeln!(out, "Error: {:#}", e)?;
                }
            },
        }
        writeln!(out)?;
    }

    Ok(())
}

fn print_answer<W: Write>(out: &mut W, answer: &Answer) -> Result<()> {
    writeln!(out, "FIT-FLIX: {}", answer.text.trim())?;
    if !answer.sources.is_empty() {
        writeln!(out, "Sources: {}", answer.sources.join(", "))?;
    }
    tracing::debug!(
        "retrieval {}ms, generation {}ms",
        answer.timings.retrieval_ms,
        answer.timings.generation_ms
    );
    Ok(())
}
