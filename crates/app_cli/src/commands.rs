use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Upload(PathBuf),
    Stats,
    Health,
    History,
    Clear,
    /// Drops the newest notification, or all of them.
    Dismiss { all: bool },
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Ask(line.trim_end_matches(['\r', '\n']).to_string());
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        match name {
            "upload" if !argument.is_empty() => Self::Upload(PathBuf::from(argument)),
            "stats" => Self::Stats,
            "health" => Self::Health,
            "history" => Self::History,
            "clear" => Self::Clear,
            "dismiss" if argument.is_empty() => Self::Dismiss { all: false },
            "dismiss" if argument == "all" => Self::Dismiss { all: true },
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}
