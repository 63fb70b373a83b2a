//! Commands issued by the control surface

use std::str::FromStr;
use thiserror::Error;

use crate::capture::SourceId;

/// One control-surface command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Enumerate capture sources
    List,
    /// Start capturing; the default source when no id is given
    Start(Option<SourceId>),
    /// Stop capturing and clear the overlay
    Stop,
    /// Report pipeline state and counters
    Status,
    /// Stop and exit
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (expected list, start [id], stop, status or quit)")]
    Unknown(String),
    #[error("'{0}' takes no arguments")]
    UnexpectedArgument(String),
}

impl FromStr for ControlCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseCommandError::Empty);
        };
        let verb = verb.to_ascii_lowercase();
        let rest: Vec<&str> = words.collect();

        let no_args = |command: ControlCommand| {
            if rest.is_empty() {
                Ok(command)
            } else {
                Err(ParseCommandError::UnexpectedArgument(verb.clone()))
            }
        };

        match verb.as_str() {
            "list" | "ls" => no_args(ControlCommand::List),
            // Source ids may contain spaces (file names)
            "start" => Ok(ControlCommand::Start(if rest.is_empty() {
                None
            } else {
                Some(SourceId::new(rest.join(" ")))
            })),
            "stop" => no_args(ControlCommand::Stop),
            "status" => no_args(ControlCommand::Status),
            "quit" | "exit" => no_args(ControlCommand::Quit),
            _ => Err(ParseCommandError::Unknown(verb.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("list".parse::<ControlCommand>(), Ok(ControlCommand::List));
        assert_eq!("  STOP ".parse::<ControlCommand>(), Ok(ControlCommand::Stop));
        assert_eq!("status".parse::<ControlCommand>(), Ok(ControlCommand::Status));
        assert_eq!("exit".parse::<ControlCommand>(), Ok(ControlCommand::Quit));
    }

    #[test]
    fn test_parse_start() {
        assert_eq!("start".parse::<ControlCommand>(), Ok(ControlCommand::Start(None)));
        assert_eq!(
            "start screen:1".parse::<ControlCommand>(),
            Ok(ControlCommand::Start(Some(SourceId::from("screen:1"))))
        );
        assert_eq!(
            "start file:menu  shot.png".parse::<ControlCommand>(),
            Ok(ControlCommand::Start(Some(SourceId::from("file:menu shot.png"))))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ControlCommand>(), Err(ParseCommandError::Empty));
        assert_eq!(
            "pause".parse::<ControlCommand>(),
            Err(ParseCommandError::Unknown("pause".into()))
        );
        assert_eq!(
            "stop now".parse::<ControlCommand>(),
            Err(ParseCommandError::UnexpectedArgument("stop".into()))
        );
    }
}
