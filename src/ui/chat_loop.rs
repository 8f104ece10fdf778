//! Interactive chat loop.
//!
//! Reads lines from stdin and presentation events from the manager in one
//! `select!` loop, so replies keep streaming onto the screen while the
//! user types.

use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::commands::{parse_command, Command, HELP_TEXT};
use crate::core::manager::{ChatManager, PresentationEvent, SubmitOutcome};
use crate::core::session::SessionId;
use crate::ui::transcript::TranscriptView;

/// Time in-flight replies get to finish after the user quits.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, PartialEq, Eq)]
enum LoopAction {
    Continue,
    Quit,
}

pub async fn run_chat(
    manager: ChatManager,
    mut events: mpsc::UnboundedReceiver<PresentationEvent>,
) -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout();
    let mut view = TranscriptView::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    writeln!(stdout, "Type a message to chat, or /help for commands.")?;
    manager.create_session();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                view.render(&event, manager.active_session(), &mut stdout)?;
                stdout.flush()?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                let action =
                    handle_line(&manager, &mut view, &mut events, &line, &mut stdout).await?;
                stdout.flush()?;
                if action == LoopAction::Quit {
                    break;
                }
            }
        }
    }

    view.interrupt(&mut stdout)?;
    manager.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

async fn handle_line<W: Write>(
    manager: &ChatManager,
    view: &mut TranscriptView,
    events: &mut mpsc::UnboundedReceiver<PresentationEvent>,
    line: &str,
    out: &mut W,
) -> io::Result<LoopAction> {
    let command = parse_command(line);
    if !matches!(command, Command::Message(_)) {
        view.interrupt(out)?;
    }

    match command {
        Command::Message(text) => match manager.submit(&text) {
            SubmitOutcome::Started(_) | SubmitOutcome::Ignored => {}
            SubmitOutcome::Busy => {
                view.interrupt(out)?;
                writeln!(
                    out,
                    "Still answering the previous message. Wait for it, or /stop it."
                )?;
            }
            SubmitOutcome::NoActiveSession | SubmitOutcome::UnknownSession => {
                writeln!(out, "No chat is open. Start one with /new.")?;
            }
            SubmitOutcome::ShuttingDown => writeln!(out, "Shutting down.")?,
        },
        Command::New => {
            let session_id = manager.create_session();
            let title = manager.title(session_id).unwrap_or_default();
            writeln!(out, "== {title} ==")?;
        }
        Command::List => list_sessions(manager, out)?,
        Command::Switch(position) => match manager.session_at(position) {
            Some(session_id) => show_session(manager, view, events, session_id, out)?,
            None => writeln!(out, "There is no chat {position}. See /list.")?,
        },
        Command::Rename(title) => {
            let renamed = manager
                .active_session()
                .is_some_and(|session_id| manager.rename_session(session_id, &title));
            if !renamed {
                writeln!(out, "No chat is open. Start one with /new.")?;
            }
        }
        Command::Delete(position) => {
            let target = match position {
                Some(position) => manager.session_at(position),
                None => manager.active_session(),
            };
            let Some(session_id) = target else {
                writeln!(out, "No such chat. See /list.")?;
                return Ok(LoopAction::Continue);
            };
            let was_active = manager.active_session() == Some(session_id);
            if let Err(err) = manager.delete_session(session_id).await {
                writeln!(out, "Chat closed, but its history could not be cleared: {err}")?;
            }
            match manager.active_session() {
                None => {
                    manager.create_session();
                }
                Some(active) if was_active => show_session(manager, view, events, active, out)?,
                Some(_) => {}
            }
        }
        Command::Stop => {
            let stopped = manager
                .active_session()
                .is_some_and(|session_id| manager.cancel_stream(session_id));
            if !stopped {
                writeln!(out, "Nothing to stop.")?;
            }
        }
        Command::Help => writeln!(out, "{HELP_TEXT}")?,
        Command::Quit => return Ok(LoopAction::Quit),
        Command::Invalid(message) => writeln!(out, "{message}")?,
    }
    Ok(LoopAction::Continue)
}

fn list_sessions<W: Write>(manager: &ChatManager, out: &mut W) -> io::Result<()> {
    for (i, summary) in manager.sessions().iter().enumerate() {
        let marker = if summary.active { '*' } else { ' ' };
        let status = if summary.streaming { ", replying" } else { "" };
        writeln!(
            out,
            "{marker} {}. {} ({} messages{status})",
            i + 1,
            summary.title,
            summary.turn_count
        )?;
    }
    Ok(())
}

/// Display `session_id` from a fresh snapshot, dropping queued events the
/// snapshot already covers.
fn show_session<W: Write>(
    manager: &ChatManager,
    view: &mut TranscriptView,
    events: &mut mpsc::UnboundedReceiver<PresentationEvent>,
    session_id: SessionId,
    out: &mut W,
) -> io::Result<()> {
    let snapshot = manager.activate(session_id, || {
        let mut dropped = 0usize;
        while events.try_recv().is_ok() {
            dropped += 1;
        }
        debug!(dropped, "queued events covered by snapshot");
    });
    match snapshot {
        Some(snapshot) => view.show_session(
            snapshot.session_id,
            &snapshot.title,
            &snapshot.turns,
            snapshot.pending.as_deref(),
            out,
        ),
        None => Ok(()),
    }
}
