//! The per-player state machine.

use std::fmt;

use peril_protocol::{ArmyMove, Location, Player, PlayingState, RecognitionOfWar, Unit, UnitRank};

use crate::war::{self, Victor};
use crate::GameError;

/// What an incoming [`ArmyMove`] means for the local player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move lands somewhere the local player has no units.
    Safe,
    /// The move lands on local units; the declaration to publish is attached.
    MakeWar(RecognitionOfWar),
    /// The local player's own move, echoed back.
    SamePlayer,
    /// The move carries no mover, so it cannot be attributed to anyone.
    Unknown,
}

/// How a war ended from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarOutcome {
    NotInvolved,
    NoUnits,
    OpponentWon,
    YouWon,
    Draw,
}

/// The full result of handling a [`RecognitionOfWar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarResolution {
    pub outcome: WarOutcome,
    /// The local player's username.
    pub local: String,
    /// The other side, unless the local player was not involved.
    pub opponent: Option<String>,
    /// Where the fight happened, if it happened.
    pub location: Option<Location>,
    /// Local units destroyed by this war.
    pub destroyed: Vec<Unit>,
}

impl WarResolution {
    fn without_battle(outcome: WarOutcome, local: String, opponent: Option<String>) -> Self {
        Self {
            outcome,
            local,
            opponent,
            location: None,
            destroyed: Vec::new(),
        }
    }

    pub fn winner(&self) -> Option<&str> {
        match self.outcome {
            WarOutcome::YouWon => Some(&self.local),
            WarOutcome::OpponentWon => self.opponent.as_deref(),
            _ => None,
        }
    }

    pub fn loser(&self) -> Option<&str> {
        match self.outcome {
            WarOutcome::YouWon => self.opponent.as_deref(),
            WarOutcome::OpponentWon => Some(&self.local),
            _ => None,
        }
    }

    /// The game log line for a concluded war; `None` if nothing was fought.
    pub fn log_message(&self) -> Option<String> {
        match self.outcome {
            WarOutcome::YouWon | WarOutcome::OpponentWon => {
                let (winner, loser) = (self.winner()?, self.loser()?);
                Some(format!("{winner} won a war against {loser}"))
            }
            WarOutcome::Draw => {
                let opponent = self.opponent.as_deref()?;
                Some(format!(
                    "A war between {} and {opponent} resulted in a draw",
                    self.local
                ))
            }
            WarOutcome::NotInvolved | WarOutcome::NoUnits => None,
        }
    }
}

/// A snapshot of the local state, for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStatus {
    pub username: String,
    pub is_paused: bool,
    pub units: Vec<Unit>,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Player: {}", self.username)?;
        writeln!(f, "Paused: {}", self.is_paused)?;
        if self.units.is_empty() {
            return write!(f, "No units");
        }
        write!(f, "Units:")?;
        for unit in &self.units {
            write!(f, "\n  * {}: {} at {}", unit.id, unit.rank, unit.location)?;
        }
        Ok(())
    }
}

/// One player's units and pause flag.
///
/// Commands (`spawn`, `move_units`) are issued by the local player and may
/// fail; incoming events (`handle_*`) never fail and report what they did.
#[derive(Debug, Clone)]
pub struct GameState {
    player: Player,
    paused: bool,
    next_unit_id: u32,
}

impl GameState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            player: Player::new(username),
            paused: false,
            next_unit_id: 1,
        }
    }

    pub fn username(&self) -> &str {
        &self.player.username
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The live player, as it would be snapshotted into an outgoing message.
    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn get_unit(&self, id: u32) -> Option<Unit> {
        self.player.units.iter().find(|unit| unit.id == id).cloned()
    }

    pub fn status(&self) -> GameStatus {
        GameStatus {
            username: self.player.username.clone(),
            is_paused: self.paused,
            units: self.player.units.clone(),
        }
    }

    /// Adds a new unit at `location`. Ids are never reused.
    pub fn spawn(&mut self, location: Location, rank: UnitRank) -> Result<Unit, GameError> {
        self.ensure_running()?;
        if location.as_str().is_empty() {
            return Err(GameError::Usage("spawn <location> <rank>".into()));
        }
        let unit = Unit {
            id: self.next_unit_id,
            rank,
            location,
        };
        self.next_unit_id += 1;
        self.player.units.push(unit.clone());
        tracing::info!(
            player = %self.player.username,
            unit_id = unit.id,
            rank = %unit.rank,
            location = %unit.location,
            "unit spawned"
        );
        Ok(unit)
    }

    /// Moves the listed units to `to` and returns the move to broadcast.
    ///
    /// Nothing moves unless every id names an owned unit.
    pub fn move_units(&mut self, to: Location, unit_ids: &[u32]) -> Result<ArmyMove, GameError> {
        self.ensure_running()?;
        if to.as_str().is_empty() || unit_ids.is_empty() {
            return Err(GameError::Usage("move <location> <unitID> [unitID...]".into()));
        }

        let mut ids: Vec<u32> = Vec::with_capacity(unit_ids.len());
        for &id in unit_ids {
            if self.get_unit(id).is_none() {
                return Err(GameError::UnitNotFound(id));
            }
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(unit) = self.player.units.iter_mut().find(|unit| unit.id == id) {
                unit.location = to.clone();
                moved.push(unit.clone());
            }
        }
        tracing::info!(
            player = %self.player.username,
            to = %to,
            units = moved.len(),
            "units moved"
        );
        Ok(ArmyMove {
            player: self.player.clone(),
            units: moved,
            to_location: to,
        })
    }

    /// Applies a pause/resume broadcast. Repeats are harmless.
    pub fn handle_pause(&mut self, state: PlayingState) {
        if self.paused != state.is_paused {
            tracing::info!(player = %self.player.username, paused = state.is_paused, "pause state changed");
        }
        self.paused = state.is_paused;
    }

    /// Classifies another player's move. Never mutates local state.
    pub fn handle_move(&self, army_move: &ArmyMove) -> MoveOutcome {
        if army_move.player.username.is_empty() {
            return MoveOutcome::Unknown;
        }
        if army_move.player.username == self.player.username {
            return MoveOutcome::SamePlayer;
        }
        // Only the destination matters; the unit list may be empty or stale.
        if self.player.occupies(&army_move.to_location) {
            return MoveOutcome::MakeWar(RecognitionOfWar {
                attacker: army_move.player.clone(),
                defender: self.player.clone(),
            });
        }
        MoveOutcome::Safe
    }

    /// Resolves a war declaration. When the local side loses or draws, its
    /// units at the contested location are destroyed.
    pub fn handle_war(&mut self, recognition: &RecognitionOfWar) -> WarResolution {
        let local = self.player.username.clone();
        let attacker = &recognition.attacker;
        let defender = &recognition.defender;

        let (opponent, local_attacks) = if attacker.username == defender.username {
            return WarResolution::without_battle(WarOutcome::NotInvolved, local, None);
        } else if attacker.username == local {
            (defender.username.clone(), true)
        } else if defender.username == local {
            (attacker.username.clone(), false)
        } else {
            return WarResolution::without_battle(WarOutcome::NotInvolved, local, None);
        };

        let Some(battle) = war::resolve_war(attacker, defender) else {
            return WarResolution::without_battle(WarOutcome::NoUnits, local, Some(opponent));
        };

        let outcome = match (battle.victor(), local_attacks) {
            (Victor::Draw, _) => WarOutcome::Draw,
            (Victor::Attacker, true) | (Victor::Defender, false) => WarOutcome::YouWon,
            (Victor::Attacker, false) | (Victor::Defender, true) => WarOutcome::OpponentWon,
        };
        let destroyed = match outcome {
            WarOutcome::YouWon => Vec::new(),
            _ => self.remove_units_at(&battle.location),
        };

        tracing::info!(
            player = %local,
            %opponent,
            location = %battle.location,
            attacker_power = battle.attacker_power,
            defender_power = battle.defender_power,
            ?outcome,
            destroyed = destroyed.len(),
            "war resolved"
        );
        WarResolution {
            outcome,
            local,
            opponent: Some(opponent),
            location: Some(battle.location),
            destroyed,
        }
    }

    fn ensure_running(&self) -> Result<(), GameError> {
        if self.paused {
            Err(GameError::Paused)
        } else {
            Ok(())
        }
    }

    fn remove_units_at(&mut self, location: &Location) -> Vec<Unit> {
        let (lost, kept): (Vec<Unit>, Vec<Unit>) = std::mem::take(&mut self.player.units)
            .into_iter()
            .partition(|unit| &unit.location == location);
        self.player.units = kept;
        lost
    }
}
