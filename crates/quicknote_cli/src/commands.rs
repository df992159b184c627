//! Line-oriented command grammar for the interactive shell.
//!
//! # Invariants
//! - Parsing is pure: no I/O and no access to core state.
//! - Numeric note references are 1-based list positions; anything else is a
//!   note id.

use std::fmt::{Display, Formatter};

pub const HELP: &str = "\
commands:
  login <email>     send a one-time code to <email>
  verify <code>     finish signing in with the emailed code
  back              abandon the pending code
  logout            sign out
  whoami            show the current session
  list              show notes
  new               start a new note
  title <text>      set the title of the note being written or edited
  body [text]       set the body of the note being written or edited
  save              save the new note or the edit
  cancel            discard the new note or the edit
  edit <n|id>       edit a note
  delete <n|id>     delete a note (asks for confirmation)
  reload            fetch notes again
  help              show this help
  quit              exit";

/// A note addressed either by list position or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteRef {
    Position(usize),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(String),
    Verify(String),
    Back,
    Logout,
    WhoAmI,
    List,
    New,
    Title(String),
    Body(String),
    Save,
    Cancel,
    Edit(NoteRef),
    Delete(NoteRef),
    Reload,
    Help,
    Quit,
    /// Blank input line.
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown(String),
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    UnexpectedArgument(&'static str),
    /// Position `0` in a 1-based list.
    ZeroPosition,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(word) => write!(f, "unknown command `{word}`; try `help`"),
            Self::MissingArgument { command, argument } => {
                write!(f, "`{command}` needs <{argument}>")
            }
            Self::UnexpectedArgument(command) => write!(f, "`{command}` takes no arguments"),
            Self::ZeroPosition => write!(f, "note numbers start at 1"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses one input line.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Nothing);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "login" => required("login", "email", rest).map(Command::Login),
        "verify" => required("verify", "code", rest).map(Command::Verify),
        "title" => required("title", "text", rest).map(Command::Title),
        "body" => Ok(Command::Body(rest.to_string())),
        "edit" => note_ref("edit", rest).map(Command::Edit),
        "delete" | "rm" => note_ref("delete", rest).map(Command::Delete),
        "back" => bare("back", rest, Command::Back),
        "logout" => bare("logout", rest, Command::Logout),
        "whoami" => bare("whoami", rest, Command::WhoAmI),
        "list" | "ls" => bare("list", rest, Command::List),
        "new" => bare("new", rest, Command::New),
        "save" => bare("save", rest, Command::Save),
        "cancel" => bare("cancel", rest, Command::Cancel),
        "reload" => bare("reload", rest, Command::Reload),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => bare("quit", rest, Command::Quit),
        _ => Err(ParseError::Unknown(word.to_string())),
    }
}

/// `true` for an affirmative answer to a confirmation prompt.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn required(
    command: &'static str,
    argument: &'static str,
    rest: &str,
) -> Result<String, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::MissingArgument { command, argument });
    }
    Ok(rest.to_string())
}

fn bare(command: &'static str, rest: &str, parsed: Command) -> Result<Command, ParseError> {
    if rest.is_empty() {
        Ok(parsed)
    } else {
        Err(ParseError::UnexpectedArgument(command))
    }
}

fn note_ref(command: &'static str, rest: &str) -> Result<NoteRef, ParseError> {
    let target = required(command, "n|id", rest)?;
    if !target.chars().all(|c| c.is_ascii_digit()) {
        return Ok(NoteRef::Id(target));
    }
    match target.parse::<usize>() {
        Ok(0) => Err(ParseError::ZeroPosition),
        Ok(position) => Ok(NoteRef::Position(position)),
        // Too long to be a position.
        Err(_) => Ok(NoteRef::Id(target)),
    }
}
