//! Line-oriented chat loop driving a [`RagSession`].

use std::future::Future;
use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::session::{RagSession, TurnEvent, TurnOutcome};

const RULE_WIDTH: usize = 60;
const CONTEXT_PREVIEW_CHARS: usize = 200;
const RESET_COMMAND: &str = "/reset";

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user typed `quit` or `exit`.
    Quit,
    /// Input reached end of file.
    EndOfInput,
    /// The shutdown future resolved (Ctrl-C in the binary).
    Interrupted,
}

/// Presentation settings for the loop.
#[derive(Debug, Clone)]
pub struct ReplOptions {
    /// Domain named in the banner and farewell.
    pub domain: String,
    /// Print a preview of the retrieved context after each answer.
    pub show_context: bool,
}

/// True for `quit` or `exit`, ignoring case and surrounding whitespace.
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit")
}

/// Greeting printed once at startup.
pub fn banner(domain: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!(
        "{rule}\nWelcome to the {domain} assistant!\n{rule}\n\
         Ask me anything about {domain}.\n\
         Type 'quit' or 'exit' to end the conversation, '{RESET_COMMAND}' to start over.\n{rule}"
    )
}

/// Message printed on every clean exit.
pub fn farewell(domain: &str) -> String {
    format!("Thanks for using the {domain} assistant! Happy coding!")
}

/// Reads questions from `input` until quit, end of input or `shutdown`.
///
/// The farewell is written for every exit reason. Turn failures are reported
/// on `out` and the loop keeps prompting; only I/O errors end it early.
pub async fn run<R, W, F>(
    session: &mut RagSession,
    input: R,
    out: &mut W,
    options: &ReplOptions,
    shutdown: F,
) -> Result<ExitReason>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut lines = input.lines();
    writeln!(out, "{}", banner(&options.domain))?;

    let reason = loop {
        write!(out, "\nYour question: ")?;
        out.flush()?;

        let line = tokio::select! {
            _ = &mut shutdown => break ExitReason::Interrupted,
            line = lines.next_line() => line.context("failed to read input")?,
        };
        let Some(line) = line else {
            writeln!(out)?;
            break ExitReason::EndOfInput;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            break ExitReason::Quit;
        }
        if question == RESET_COMMAND {
            session.reset();
            writeln!(out, "Conversation cleared.")?;
            continue;
        }

        writeln!(out, "Processing your question...")?;
        let result = tokio::select! {
            _ = &mut shutdown => break ExitReason::Interrupted,
            result = session.chat_turn_observed(question, |event| report(out, event)) => result,
        };
        match result {
            Ok(outcome) => render_outcome(out, &outcome, options)?,
            Err(err) => writeln!(out, "error: {err}")?,
        }
    };

    writeln!(out, "\n{}", farewell(&options.domain))?;
    out.flush()?;
    Ok(reason)
}

// Progress lines never abort a turn; a broken output surfaces at the next prompt write.
fn report<W: Write>(out: &mut W, event: TurnEvent) {
    let written = match &event {
        TurnEvent::Rewritten(query) => writeln!(out, "Interpreted as: \"{query}\""),
        TurnEvent::Retrieving => writeln!(out, "Searching knowledge base..."),
        TurnEvent::Generating => writeln!(out, "Generating response..."),
    };
    if let Err(err) = written {
        debug!(error = %err, ?event, "failed to write progress line");
    }
}

fn render_outcome<W: Write>(
    out: &mut W,
    outcome: &TurnOutcome,
    options: &ReplOptions,
) -> Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "\n{rule}\n{} answer:\n{rule}", options.domain)?;
    writeln!(out, "{}", outcome.answer)?;
    writeln!(out, "{rule}")?;

    if options.show_context {
        let preview: String = outcome
            .context
            .chars()
            .take(CONTEXT_PREVIEW_CHARS)
            .collect();
        writeln!(
            out,
            "[context: {} passages, {} chars] {preview}",
            outcome.passages,
            outcome.context.len()
        )?;
    }
    Ok(())
}
