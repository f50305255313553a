//! Line commands understood by the terminal client.

use alumnet_shared::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List conversation partners with their online state.
    Users,
    /// Select a counterpart and load its history.
    Open(UserId),
    Online,
    Unread,
    /// Clear the unread counter of a counterpart, or of the open conversation.
    Read(Option<UserId>),
    /// Toggle notifications, or set them explicitly.
    Notify(Option<bool>),
    /// Plain text: send to the selected counterpart.
    Send(String),
    Logout,
    Quit,
    Help,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match (name, arg) {
            ("users", _) => Command::Users,
            ("open", id) if !id.is_empty() => Command::Open(UserId::from(id)),
            ("online", _) => Command::Online,
            ("unread", _) => Command::Unread,
            ("read", "") => Command::Read(None),
            ("read", id) => Command::Read(Some(UserId::from(id))),
            ("notify", "") => Command::Notify(None),
            ("notify", "on") => Command::Notify(Some(true)),
            ("notify", "off") => Command::Notify(Some(false)),
            ("logout", _) => Command::Logout,
            ("quit" | "exit", _) => Command::Quit,
            ("help", _) => Command::Help,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
/users          list conversation partners
/open <id>      open a conversation and load its history
/online         show who is online
/unread         show unread counts
/read [id]      mark a conversation read (default: the open one)
/notify [on|off] toggle new-message notices
/logout         forget this session and quit
/quit           save the session and quit
anything else   send to the open conversation";
