//! REPL session management

use chrono::Local;
use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::display::spawn_printer;
use crate::session::{Session, TurnOutcome, TurnRole};
use crate::skill::parse_explicit;

/// Characters of each turn shown by `/history`
const HISTORY_PREVIEW_CHARS: usize = 60;

/// Interactive loop around one [`Session`]
pub struct ReplSession {
    session: Session,
}

impl ReplSession {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(input);

                    match self.handle_slash_command(input) {
                        SlashResult::Continue => continue,
                        SlashResult::Quit => break,
                        SlashResult::Submit => {
                            submit_turn(&mut self.session, input).await;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Pulp".bright_cyan().bold());
        match self.session.document() {
            Some(doc) => {
                let title = if doc.title.is_empty() { "(untitled)" } else { doc.title.as_str() };
                println!("Document: {}", title.bright_white());
                println!(
                    "{}",
                    format!("{} words, {}", doc.word_count, doc.metadata.file_size_human()).dimmed()
                );
                println!("Tell me what to do with it, e.g. {}", "\"summarize for my boss\"".yellow());
            }
            None => {
                println!("Chat mode. Start a line with {} to use a skill.", "/<skill>".yellow());
            }
        }
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let Some((cmd, _)) = parse_explicit(input) else {
            return SlashResult::Submit;
        };

        match cmd {
            "help" | "h" => {
                self.print_help();
                SlashResult::Continue
            }
            "quit" | "q" | "exit" => SlashResult::Quit,
            "reset" => {
                self.session.reset();
                println!("{}", "Session reset. The next instruction starts fresh.".dimmed());
                SlashResult::Continue
            }
            "history" => {
                self.print_history();
                SlashResult::Continue
            }
            "skills" => {
                self.print_skills();
                SlashResult::Continue
            }
            name if self.session.services().skills.store().get(name).is_some() => {
                debug!(%name, "handle_slash_command: skill invocation");
                SlashResult::Submit
            }
            _ => {
                println!("{} Unknown command: /{}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                SlashResult::Continue
            }
        }
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:16} Show this help", "/help".yellow());
        println!("  {:16} Exit", "/quit".yellow());
        println!("  {:16} Forget results and history, keep the document", "/reset".yellow());
        println!("  {:16} Show conversation history", "/history".yellow());
        println!("  {:16} List available skills", "/skills".yellow());
        println!("  {:16} Run an instruction with a skill", "/<skill> ...".yellow());
        println!();
        println!("Press {} while a response streams to cancel it.", "Ctrl-C".yellow());
        println!();
    }

    fn print_history(&self) {
        let history = self.session.history();
        if history.is_empty() {
            println!("{}", "No conversation history.".dimmed());
            return;
        }

        println!();
        println!("{}", "Conversation History:".bright_cyan());
        for (i, turn) in history.iter().enumerate() {
            let role = match turn.role {
                TurnRole::User => "You".bright_green(),
                TurnRole::Assistant => "Pulp".bright_blue(),
            };
            let preview: String = turn.content.chars().take(HISTORY_PREVIEW_CHARS).collect();
            let ellipsis = if turn.content.chars().count() > HISTORY_PREVIEW_CHARS { "..." } else { "" };
            let time = turn.created_at.with_timezone(&Local).format("%H:%M:%S");
            println!(
                "  {}. {} {}: {}{}",
                i + 1,
                time.to_string().dimmed(),
                role,
                preview.replace('\n', " "),
                ellipsis
            );
        }
        println!();
    }

    fn print_skills(&self) {
        print_skill_list(self.session.services().skills.store().list().as_slice());
        if let Some(skill) = self.session.active_skill() {
            println!("Active: {}", skill.name().bright_white());
            println!();
        }
    }
}

/// Print a skill catalog
pub fn print_skill_list(skills: &[crate::skill::SkillMetadata]) {
    if skills.is_empty() {
        println!("{}", "No skills installed.".dimmed());
        return;
    }
    println!();
    println!("{}", "Skills:".bright_cyan());
    for meta in skills {
        println!("  {:16} {}", format!("/{}", meta.name).yellow(), meta.description);
    }
    println!();
}

/// Run one turn with Ctrl-C wired to cancellation and events printed live
pub async fn submit_turn(session: &mut Session, instruction: &str) -> TurnOutcome {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_printer(rx);

    let outcome = session.submit(instruction, &tx, &cancel).await;

    interrupt.abort();
    drop(tx);
    let _ = printer.await;
    outcome
}

/// Result of handling a slash command
enum SlashResult {
    Continue,
    Quit,
    /// Not a REPL command; send the line to the session
    Submit,
}
