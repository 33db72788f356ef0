//! Slash commands of the interactive session
//!
//! Lines typed in the session REPL are either spoken by the avatar or, when
//! prefixed with `/`, parsed into a [`SpecialCommand`] that drives the
//! session controller. Commands are case-insensitive.

use crate::session::InteractionMode;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Commands understood by the session REPL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Cut the avatar off mid-utterance
    Interrupt,

    /// Switch between text and voice interaction
    SwitchMode(InteractionMode),

    /// Start recording a voice message
    Record,

    /// Stop recording and send the voice message
    Send,

    /// Save the project and end the session
    Save,

    /// Show lifecycle state and the countdown
    ShowStatus,

    /// Display help information
    Help,

    /// End the session and leave the REPL
    Exit,

    /// Not a command; the text is spoken by the avatar
    Speak(String),
}

/// Parse a REPL line into a command
///
/// # Errors
///
/// Returns [`CommandError::UnknownCommand`] for an unrecognised `/` command,
/// and the argument variants when `/mode` is misused.
///
/// # Examples
///
/// ```
/// use aihuman::commands::special_commands::{parse_special_command, SpecialCommand};
/// use aihuman::session::InteractionMode;
///
/// let cmd = parse_special_command("/mode text").unwrap();
/// assert_eq!(cmd, SpecialCommand::SwitchMode(InteractionMode::Text));
///
/// let cmd = parse_special_command("hello there").unwrap();
/// assert_eq!(cmd, SpecialCommand::Speak("hello there".to_string()));
///
/// assert!(parse_special_command("/dance").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::Speak(trimmed.to_string()));
    }

    match lower.as_str() {
        "/interrupt" | "/stop" => Ok(SpecialCommand::Interrupt),

        "/mode text" | "/text" => Ok(SpecialCommand::SwitchMode(InteractionMode::Text)),
        "/mode voice" | "/voice" => Ok(SpecialCommand::SwitchMode(InteractionMode::Voice)),
        "/mode" => Err(CommandError::MissingArgument {
            command: "/mode".to_string(),
            usage: "/mode <text|voice>".to_string(),
        }),
        input if input.starts_with("/mode ") => Err(CommandError::UnsupportedArgument {
            command: "/mode".to_string(),
            arg: input[6..].trim().to_string(),
        }),

        "/record" => Ok(SpecialCommand::Record),
        "/send" => Ok(SpecialCommand::Send),
        "/save" => Ok(SpecialCommand::Save),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/end" | "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print the REPL help text
pub fn print_help() {
    println!(
        r#"
Session Commands
================

Anything that does not start with '/' is spoken by the avatar.

  /interrupt, /stop     Cut the avatar off mid-sentence
  /mode <text|voice>    Switch interaction mode (also /text, /voice)
  /record               Start recording a voice message (voice mode)
  /send                 Stop recording and send the message
  /save                 Save the project and end the session
  /status               Show session state and time remaining
  /help, /?             Show this help
  /end, exit, quit      End the session

A session ends on its own when the countdown reaches zero; the project is
then saved automatically.
"#
    );
}
