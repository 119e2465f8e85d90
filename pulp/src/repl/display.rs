//! Terminal rendering of session events

use std::io::{self, Write};

use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::Stage;
use crate::session::SessionEvent;
use crate::skill::SkillSource;

/// Print one event
pub fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Progress(p) => {
            let step = format!("[{}/{}]", p.stage_index, p.total_stages);
            if p.stage == Stage::Done {
                println!("{} {}", step.dimmed(), p.message.green());
            } else {
                println!("{} {}", step.dimmed(), p.message.dimmed());
            }
        }
        SessionEvent::IntentResolved(intent) => {
            println!("{} {}", "Intent:".bright_cyan(), intent.summary().dimmed());
        }
        SessionEvent::SkillActivated { name, source } => {
            let how = match source {
                SkillSource::Explicit => "explicit".to_string(),
                SkillSource::Semantic { confidence } => format!("matched, {:.0}%", confidence * 100.0),
            };
            println!("{} {} {}", "Skill:".bright_cyan(), name.bright_white(), format!("({})", how).dimmed());
        }
        SessionEvent::Fragment(text) => {
            print!("{}", text);
            let _ = io::stdout().flush();
        }
        SessionEvent::Done { .. } => {
            println!();
        }
        SessionEvent::Error(message) => {
            eprintln!("\n{} {}", "Error:".red(), message);
        }
        SessionEvent::Cancelled => {
            println!("\n{}", "[cancelled]".yellow());
        }
    }
}

/// Print events until the sender side is dropped
pub fn spawn_printer(mut rx: mpsc::UnboundedReceiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    })
}
