//! Interactive REPL for Pulp
//!
//! Line-oriented front end over a [`Session`]: every line is a turn, slash
//! commands manage the session, and Ctrl-C cancels a streaming response.

mod display;
mod session;

pub use display::{print_event, spawn_printer};
pub use session::{ReplSession, print_skill_list, submit_turn};

use eyre::{Result, bail};

use crate::session::{Session, TurnOutcome};

/// Run the interactive REPL
///
/// This is the main entry point for `pulp chat`.
pub async fn run_interactive(session: Session) -> Result<()> {
    let mut repl = ReplSession::new(session);
    repl.run().await
}

/// Run a single instruction and exit
///
/// This is the main entry point for `pulp run`.
pub async fn run_once(mut session: Session, instruction: &str) -> Result<()> {
    match submit_turn(&mut session, instruction).await {
        TurnOutcome::Completed { .. } => Ok(()),
        TurnOutcome::Cancelled => bail!("Cancelled"),
        TurnOutcome::Failed { message } => bail!(message),
    }
}
