//! Parsing of shell input into commands.

use peril_protocol::{Location, UnitRank};

use crate::GameError;

/// A line typed into the client shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `spawn <location> <rank>`
    Spawn { location: Location, rank: UnitRank },
    /// `move <location> <unitID> [unitID...]`
    Move { to: Location, unit_ids: Vec<u32> },
    Status,
    /// `spam <n>`: publish `n` filler game logs.
    Spam { count: u32 },
    Help,
    Quit,
}

impl ClientCommand {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, GameError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match name {
            "spawn" => match args.as_slice() {
                [location, rank] => Self::Spawn {
                    location: Location::new(*location),
                    rank: rank.parse()?,
                },
                _ => return Err(GameError::Usage("spawn <location> <rank>".into())),
            },
            "move" => match args.split_first() {
                Some((to, ids)) if !ids.is_empty() => Self::Move {
                    to: Location::new(*to),
                    unit_ids: ids
                        .iter()
                        .map(|id| parse_number(id, "unit id"))
                        .collect::<Result<_, _>>()?,
                },
                _ => {
                    return Err(GameError::Usage(
                        "move <location> <unitID> [unitID...]".into(),
                    ));
                }
            },
            "spam" => match args.as_slice() {
                [count] => Self::Spam {
                    count: parse_number(count, "count")?,
                },
                _ => return Err(GameError::Usage("spam <n>".into())),
            },
            "status" => Self::Status,
            "help" => Self::Help,
            "quit" => Self::Quit,
            other => return Err(GameError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    pub const HELP: &'static str = "\
Possible commands:
* move <location> <unitID> <unitID> <unitID>...
    example:
    move asia 1
* spawn <location> <rank>
    example:
    spawn europe infantry
* status
* spam <n>
* help
* quit";
}

/// A line typed into the server shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    Pause,
    Resume,
    Help,
    Quit,
}

impl ServerCommand {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, GameError> {
        let Some(name) = line.split_whitespace().next() else {
            return Ok(None);
        };
        let command = match name {
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "help" => Self::Help,
            "quit" => Self::Quit,
            other => return Err(GameError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    pub const HELP: &'static str = "\
Possible commands:
* pause
* resume
* help
* quit";
}

fn parse_number(word: &str, what: &str) -> Result<u32, GameError> {
    word.parse()
        .map_err(|_| GameError::Usage(format!("invalid {what}: {word}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spawn() {
        assert_eq!(
            ClientCommand::parse("spawn europe cavalry").unwrap(),
            Some(ClientCommand::Spawn {
                location: "europe".into(),
                rank: UnitRank::Cavalry,
            })
        );
    }

    #[test]
    fn test_parse_spawn_rejects_bad_rank_and_arity() {
        assert!(matches!(
            ClientCommand::parse("spawn europe general"),
            Err(GameError::InvalidRank(_))
        ));
        assert!(matches!(
            ClientCommand::parse("spawn europe"),
            Err(GameError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_move() {
        assert_eq!(
            ClientCommand::parse("  move asia 1 3 ").unwrap(),
            Some(ClientCommand::Move {
                to: "asia".into(),
                unit_ids: vec![1, 3],
            })
        );
        assert!(matches!(
            ClientCommand::parse("move asia"),
            Err(GameError::Usage(_))
        ));
        assert!(matches!(
            ClientCommand::parse("move asia one"),
            Err(GameError::Usage(msg)) if msg.contains("one")
        ));
    }

    #[test]
    fn test_blank_and_unknown_lines() {
        assert_eq!(ClientCommand::parse("   ").unwrap(), None);
        assert!(matches!(
            ClientCommand::parse("attack"),
            Err(GameError::UnknownCommand(word)) if word == "attack"
        ));
    }

    #[test]
    fn test_parse_server_commands() {
        assert_eq!(ServerCommand::parse("pause").unwrap(), Some(ServerCommand::Pause));
        assert_eq!(ServerCommand::parse("resume now").unwrap(), Some(ServerCommand::Resume));
        assert_eq!(ServerCommand::parse("").unwrap(), None);
        assert!(ServerCommand::parse("spawn").is_err());
    }
}
