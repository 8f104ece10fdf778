//! Line-oriented rendering of presentation events.

use std::io::{self, Write};

use crate::core::manager::PresentationEvent;
use crate::core::message::{TranscriptRole, Turn};
use crate::core::session::SessionId;

/// Tracks what has already been written for the displayed session so
/// streamed text can be printed incrementally.
#[derive(Debug, Default)]
pub struct TranscriptView {
    /// Session and partial reply already on screen.
    streamed: Option<(SessionId, String)>,
}

fn write_turn<W: Write>(out: &mut W, turn: &Turn) -> io::Result<()> {
    writeln!(out, "{}: {}", turn.sender(), turn.text)
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminate a partially printed reply, if any.
    fn break_stream<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.streamed.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }

    /// Render one event. Events for sessions other than `active` are not
    /// shown; their turns are printed when that session is switched to.
    pub fn render<W: Write>(
        &mut self,
        event: &PresentationEvent,
        active: Option<SessionId>,
        out: &mut W,
    ) -> io::Result<()> {
        match event {
            PresentationEvent::StreamUpdate {
                session_id,
                partial_text,
            } if active == Some(*session_id) => {
                let resumed = match &self.streamed {
                    Some((id, printed)) if id == session_id => {
                        partial_text.strip_prefix(printed.as_str())
                    }
                    _ => None,
                };
                match resumed {
                    Some(rest) => write!(out, "{rest}")?,
                    _ => {
                        self.break_stream(out)?;
                        write!(
                            out,
                            "{}: {}",
                            TranscriptRole::Assistant.sender_label(),
                            partial_text
                        )?;
                    }
                }
                self.streamed = Some((*session_id, partial_text.clone()));
            }
            PresentationEvent::TurnAppended { session_id, turn }
                if active == Some(*session_id) =>
            {
                let resumed = match &self.streamed {
                    Some((id, printed)) if id == session_id && turn.role.is_assistant() => {
                        turn.text.strip_prefix(printed.as_str())
                    }
                    _ => None,
                };
                match resumed {
                    Some(rest) => {
                        writeln!(out, "{rest}")?;
                        self.streamed = None;
                    }
                    // The user's own line is already on screen.
                    _ if turn.role.is_user() => {}
                    _ => {
                        self.break_stream(out)?;
                        write_turn(out, turn)?;
                    }
                }
            }
            PresentationEvent::TitleChanged { session_id, title }
                if active == Some(*session_id) =>
            {
                self.break_stream(out)?;
                writeln!(out, "[{title}]")?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Print a whole session, including a reply still being streamed, and
    /// resume incremental output from there.
    pub fn show_session<W: Write>(
        &mut self,
        session_id: SessionId,
        title: &str,
        turns: &[Turn],
        pending: Option<&str>,
        out: &mut W,
    ) -> io::Result<()> {
        self.break_stream(out)?;
        writeln!(out, "== {title} ==")?;
        for turn in turns {
            write_turn(out, turn)?;
        }
        if let Some(pending) = pending {
            write!(
                out,
                "{}: {}",
                TranscriptRole::Assistant.sender_label(),
                pending
            )?;
            self.streamed = Some((session_id, pending.to_string()));
        }
        Ok(())
    }

    /// Make sure the cursor is at the start of a line before other output.
    pub fn interrupt<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        self.break_stream(out)
    }
}
