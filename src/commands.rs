//! Slash commands understood by the interactive chat.

pub const HELP_TEXT: &str = "\
Commands:
  /new              Start a new chat
  /list             List chats (* marks the active one)
  /switch <n>       Show chat number n
  /rename <title>   Rename the active chat
  /delete [n]       Delete chat n, or the active chat
  /stop             Stop the active chat's reply
  /help             Show this help
  /quit             Exit
Lines starting with // are sent as messages beginning with /.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    List,
    Switch(usize),
    Rename(String),
    Delete(Option<usize>),
    Stop,
    Help,
    Quit,
    /// Text to send to the active chat.
    Message(String),
    /// A malformed command, with the usage hint to show.
    Invalid(String),
}

fn parse_position(command: &str, arg: &str) -> Result<usize, Command> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Command::Invalid(format!(
            "Usage: /{command} <n>, where n is a chat number from /list"
        ))),
    }
}

pub fn parse_command(input: &str) -> Command {
    let trimmed = input.trim();

    if let Some(escaped) = trimmed.strip_prefix("//") {
        return Command::Message(format!("/{escaped}"));
    }
    let Some(body) = trimmed.strip_prefix('/') else {
        return Command::Message(input.to_string());
    };

    let (name, arg) = match body.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (body, ""),
    };

    match (name, arg) {
        ("new", _) => Command::New,
        ("list" | "ls", _) => Command::List,
        ("switch", arg) => match parse_position("switch", arg) {
            Ok(n) => Command::Switch(n),
            Err(usage) => usage,
        },
        ("rename", "") => Command::Invalid("Usage: /rename <title>".to_string()),
        ("rename", title) => Command::Rename(title.to_string()),
        ("delete", "") => Command::Delete(None),
        ("delete", arg) => match parse_position("delete", arg) {
            Ok(n) => Command::Delete(Some(n)),
            Err(usage) => usage,
        },
        ("stop", _) => Command::Stop,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit" | "q", _) => Command::Quit,
        (name, _) => Command::Invalid(format!(
            "Unknown command /{name}. Type /help for a list of commands."
        )),
    }
}
