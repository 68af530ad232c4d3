//! War resolution.
//!
//! A war is fought at one contested location: the first location, in the
//! attacker's unit order, where the defender also has units. Each side's
//! power there is the sum of its units' rank power; the stronger side wins
//! and equal power is a draw. The result depends only on the two player
//! snapshots, so every process that resolves the same declaration agrees.

use std::cmp::Ordering;

use peril_protocol::{Location, Player, Unit};

/// Which side of a war came out on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Victor {
    Attacker,
    Defender,
    Draw,
}

/// The fight at the contested location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Battle {
    pub location: Location,
    pub attacker_power: u32,
    pub defender_power: u32,
}

impl Battle {
    pub fn victor(&self) -> Victor {
        match self.attacker_power.cmp(&self.defender_power) {
            Ordering::Greater => Victor::Attacker,
            Ordering::Less => Victor::Defender,
            Ordering::Equal => Victor::Draw,
        }
    }
}

/// Total rank power of `units`.
pub fn power<'a>(units: impl IntoIterator<Item = &'a Unit>) -> u32 {
    units.into_iter().map(|unit| unit.rank.power()).sum()
}

/// The first attacker location the defender also occupies.
pub fn contested_location<'a>(attacker: &'a Player, defender: &Player) -> Option<&'a Location> {
    attacker
        .units
        .iter()
        .map(|unit| &unit.location)
        .find(|location| defender.occupies(location))
}

/// Fights the war between two snapshots. `None` if their units never meet.
pub fn resolve_war(attacker: &Player, defender: &Player) -> Option<Battle> {
    let location = contested_location(attacker, defender)?;
    Some(Battle {
        location: location.clone(),
        attacker_power: power(attacker.units_at(location)),
        defender_power: power(defender.units_at(location)),
    })
}
