//! Wire types: everything that travels through the broker.
//!
//! Field names are serialized in PascalCase (`IsPaused`, `ToLocation`, ...)
//! so JSON payloads stay compatible with peers that already speak the
//! Peril protocol.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A named place on the map. Any non-empty name is a location.
///
/// Newtype over `String` so a location can't be confused with a username.
/// `#[serde(transparent)]` writes it as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// Creates a location from any string-like name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the location name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ---------------------------------------------------------------------------
// UnitRank
// ---------------------------------------------------------------------------

/// The kind of a unit. Each rank has a fixed power used in war resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRank {
    Infantry,
    Cavalry,
    Artillery,
}

impl UnitRank {
    /// Every rank, weakest first.
    pub const ALL: [UnitRank; 3] = [Self::Infantry, Self::Cavalry, Self::Artillery];

    /// Fighting strength of one unit of this rank.
    pub fn power(self) -> u32 {
        match self {
            Self::Infantry => 1,
            Self::Cavalry => 5,
            Self::Artillery => 10,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Infantry => "infantry",
            Self::Cavalry => "cavalry",
            Self::Artillery => "artillery",
        }
    }
}

impl fmt::Display for UnitRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitRank {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rank| rank.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidMessage(format!("unknown unit rank: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Unit / Player
// ---------------------------------------------------------------------------

/// A single unit owned by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Unit {
    /// Per-player identifier, assigned at spawn time.
    #[serde(rename = "ID")]
    pub id: u32,
    pub rank: UnitRank,
    pub location: Location,
}

/// A player and the units they own.
///
/// The copy inside an [`ArmyMove`] or [`RecognitionOfWar`] is a snapshot;
/// only the owning player's game state ever mutates the live collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Player {
    pub username: String,
    pub units: Vec<Unit>,
}

impl Player {
    /// Creates a player with no units.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            units: Vec::new(),
        }
    }

    /// Units this player has at `location`.
    pub fn units_at<'a>(&'a self, location: &'a Location) -> impl Iterator<Item = &'a Unit> {
        self.units.iter().filter(move |u| &u.location == location)
    }

    /// Returns `true` if at least one unit stands at `location`.
    pub fn occupies(&self, location: &Location) -> bool {
        self.units_at(location).next().is_some()
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Broadcast by the server to pause or resume every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayingState {
    pub is_paused: bool,
}

/// A player moved some of their units. Sent to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArmyMove {
    /// Snapshot of the mover, taken after the move was applied.
    pub player: Player,
    /// The units that moved, in the order they were listed.
    pub units: Vec<Unit>,
    pub to_location: Location,
}

/// Two players' units met: the defender noticed and declared war.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecognitionOfWar {
    pub attacker: Player,
    pub defender: Player,
}

/// A line for the server's game log archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameLog {
    pub current_time: DateTime<Utc>,
    pub message: String,
    pub username: String,
}

impl GameLog {
    /// Creates a log entry stamped with the current time.
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            current_time: Utc::now(),
            message: message.into(),
            username: username.into(),
        }
    }
}
