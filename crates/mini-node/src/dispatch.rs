//! Mode dispatch.
//!
//! Decides from the command path alone whether a command needs the full
//! application (server mode) or only the client context (client mode).

use std::fmt;

/// Commands that build the application. Every subcommand of these does too.
const SERVER_COMMANDS: &[&str] = &["start", "init", "genesis"];

/// Path of the invoked command below the root, e.g. `["genesis", "export"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandId {
    path: Vec<String>,
}

impl CommandId {
    pub fn new<S: Into<String>>(path: impl IntoIterator<Item = S>) -> Self {
        Self {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn root(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Client,
    Server,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

pub fn requires_application(command: &CommandId) -> bool {
    command
        .root()
        .is_some_and(|root| SERVER_COMMANDS.contains(&root))
}

pub fn mode_for(command: &CommandId) -> Mode {
    if requires_application(command) {
        Mode::Server
    } else {
        Mode::Client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_commands() {
        assert!(requires_application(&CommandId::new(["start"])));
        assert!(requires_application(&CommandId::new(["init"])));
        assert!(requires_application(&CommandId::new(["genesis", "export"])));
        assert!(requires_application(&CommandId::new(["genesis", "validate"])));
    }

    #[test]
    fn test_client_commands() {
        for path in [
            vec!["query", "latest-block"],
            vec!["tx", "encode"],
            vec!["config", "view"],
            vec!["version"],
        ] {
            let command = CommandId::new(path);
            assert!(!requires_application(&command), "{command}");
            assert_eq!(mode_for(&command), Mode::Client);
        }
        assert!(!requires_application(&CommandId::new(Vec::<String>::new())));
    }

    #[test]
    fn test_only_root_decides() {
        assert!(!requires_application(&CommandId::new(["query", "start"])));
    }
}
