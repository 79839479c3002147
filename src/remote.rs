//! Remote command vocabulary
//!
//! The wire protocol is deliberately tiny: one ASCII token per line.
//! Tokens are matched case-insensitively after trimming, so `stop_save`,
//! `STOP_SAVE` and `Stop_Save\r\n` are the same command. Anything else is
//! rejected and logged by the caller; an unknown token never changes
//! recording state.

use crate::utils::error::CommandParseError;
use std::fmt;

/// A command received over the remote channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Liveness probe; answered with a pong, no state change
    Ping,
    /// Begin recording (retry after a failed begin; otherwise a no-op)
    Start,
    /// Stop the current segment and keep its files
    StopSave,
    /// Stop the current segment and delete its files
    StopDiscard,
    /// Pause video forwarding; audio keeps recording
    Pause,
    /// Resume video forwarding
    Resume,
}

impl RemoteCommand {
    /// Parse one raw line into a command.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let token = line.trim().to_ascii_uppercase();
        match token.as_str() {
            "PING" => Ok(Self::Ping),
            "START" => Ok(Self::Start),
            "STOP_SAVE" => Ok(Self::StopSave),
            "STOP_DISCARD" => Ok(Self::StopDiscard),
            "PAUSE" => Ok(Self::Pause),
            "RESUME" => Ok(Self::Resume),
            "" => Err(CommandParseError("empty line".into())),
            _ => Err(CommandParseError(format!("unknown command {token:?}"))),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Ping => "PING",
            Self::Start => "START",
            Self::StopSave => "STOP_SAVE",
            Self::StopDiscard => "STOP_DISCARD",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
        };
        f.write_str(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_token() {
        assert_eq!(RemoteCommand::parse("PING").unwrap(), RemoteCommand::Ping);
        assert_eq!(RemoteCommand::parse("START").unwrap(), RemoteCommand::Start);
        assert_eq!(
            RemoteCommand::parse("STOP_SAVE").unwrap(),
            RemoteCommand::StopSave
        );
        assert_eq!(
            RemoteCommand::parse("STOP_DISCARD").unwrap(),
            RemoteCommand::StopDiscard
        );
        assert_eq!(RemoteCommand::parse("PAUSE").unwrap(), RemoteCommand::Pause);
        assert_eq!(
            RemoteCommand::parse("RESUME").unwrap(),
            RemoteCommand::Resume
        );
    }

    #[test]
    fn matching_is_case_insensitive_and_trims() {
        assert_eq!(
            RemoteCommand::parse("  stop_save \r\n").unwrap(),
            RemoteCommand::StopSave
        );
        assert_eq!(RemoteCommand::parse("Pause").unwrap(), RemoteCommand::Pause);
    }

    #[test]
    fn unknown_and_empty_lines_are_rejected() {
        assert!(RemoteCommand::parse("SELF_DESTRUCT").is_err());
        assert!(RemoteCommand::parse("STOP SAVE").is_err());
        assert!(RemoteCommand::parse("   ").is_err());
    }

    #[test]
    fn display_round_trips() {
        for command in [
            RemoteCommand::Ping,
            RemoteCommand::Start,
            RemoteCommand::StopSave,
            RemoteCommand::StopDiscard,
            RemoteCommand::Pause,
            RemoteCommand::Resume,
        ] {
            assert_eq!(
                RemoteCommand::parse(&command.to_string()).unwrap(),
                command
            );
        }
    }
}
