//! Market book
//!
//! A battle's pools folded into one of the two market shapes. The shape is
//! picked once, when the book is built from a snapshot, and every pricing and
//! liquidity question is answered by matching on it.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::BettingError;
use super::odds::{self, OddsParams};
use crate::models::{BattleSnapshot, MarketKind};

#[derive(Debug, Clone, PartialEq)]
pub enum MarketBook {
    TwoSided {
        first: (Uuid, Decimal),
        second: (Uuid, Decimal),
    },
    MultiSided {
        volumes: Vec<(Uuid, Decimal)>,
    },
}

impl MarketBook {
    /// Build the book for a battle, checking its participant count
    pub fn from_snapshot(snapshot: &BattleSnapshot) -> Result<Self, BettingError> {
        let kind = snapshot.battle.kind;
        let volumes = snapshot.volumes();

        if !kind.accepts_participants(volumes.len()) {
            return Err(BettingError::InvalidState(format!(
                "{} battle {} has {} participants",
                kind,
                snapshot.battle.id,
                volumes.len()
            )));
        }

        Ok(match kind {
            MarketKind::TwoSided => MarketBook::TwoSided {
                first: volumes[0],
                second: volumes[1],
            },
            MarketKind::MultiSided => MarketBook::MultiSided { volumes },
        })
    }

    pub fn volumes(&self) -> Vec<(Uuid, Decimal)> {
        match self {
            MarketBook::TwoSided { first, second } => vec![*first, *second],
            MarketBook::MultiSided { volumes } => volumes.clone(),
        }
    }

    pub fn contains(&self, character_id: Uuid) -> bool {
        self.volumes().iter().any(|(id, _)| *id == character_id)
    }

    pub fn volume_of(&self, character_id: Uuid) -> Decimal {
        self.volumes()
            .into_iter()
            .find(|(id, _)| *id == character_id)
            .map(|(_, v)| v)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total(&self) -> Decimal {
        self.volumes().iter().map(|(_, v)| *v).sum()
    }

    /// Money standing against `character_id`: the other side of a two-sided
    /// book, everyone else's pools in a multi-sided one
    pub fn opposing_volume(&self, character_id: Uuid) -> Decimal {
        match self {
            MarketBook::TwoSided { first, second } => {
                if first.0 == character_id {
                    second.1
                } else {
                    first.1
                }
            }
            MarketBook::MultiSided { .. } => self.total() - self.volume_of(character_id),
        }
    }

    /// Current odds per participant, in participant order
    pub fn odds(&self, params: &OddsParams) -> Vec<(Uuid, Decimal)> {
        match self {
            MarketBook::TwoSided { first, second } => {
                let (a, b) = odds::two_sided_odds(first.1, second.1, params);
                vec![(first.0, a), (second.0, b)]
            }
            MarketBook::MultiSided { volumes } => odds::multi_sided_odds(volumes, params),
        }
    }

    pub fn odds_for(&self, character_id: Uuid, params: &OddsParams) -> Option<Decimal> {
        self.odds(params)
            .into_iter()
            .find(|(id, _)| *id == character_id)
            .map(|(_, o)| o)
    }

    /// Add `delta` to one participant's volume
    pub fn apply(&mut self, character_id: Uuid, delta: Decimal) {
        match self {
            MarketBook::TwoSided { first, second } => {
                for side in [first, second] {
                    if side.0 == character_id {
                        side.1 += delta;
                    }
                }
            }
            MarketBook::MultiSided { volumes } => {
                if let Some(entry) = volumes.iter_mut().find(|(id, _)| *id == character_id) {
                    entry.1 += delta;
                }
            }
        }
    }
}
