//! The fixed table of "best ever" stats and how each one is read off a match.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::payload::{max_series, sum_series, StatisticsPayload};
use crate::models::IngestionRequest;

/// Kel'Thuzad is a ghost opponent; damage dealt to it does not count.
pub const KELTHUZAD_CARD_ID: &str = "TB_BaconShop_HERO_KelThuzad";
/// Infinite Toki's hero power is a reroll and must not be counted twice.
pub const INFINITE_TOKI_CARD_ID: &str = "TB_BaconShop_HERO_28";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatName {
    TotalDamageDealtToMinions,
    TotalDamageTakenByMinions,
    TotalDamageDealtToHeroes,
    MaxDamageDealtToHero,
    HighestWinStreak,
    TriplesCreated,
    MaxBoardStats,
    CoinsWasted,
    Rerolls,
    HeroPowerUsed,
    Freezes,
    MinionsBought,
    MinionsSold,
    EnemyMinionsKilled,
    EnemyHeroesKilled,
    PercentageOfBattlesGoingFirst,
    BattleLuck,
    NegativeBattleLuck,
}

impl StatName {
    pub const ALL: [StatName; 18] = [
        StatName::TotalDamageDealtToMinions,
        StatName::TotalDamageTakenByMinions,
        StatName::TotalDamageDealtToHeroes,
        StatName::MaxDamageDealtToHero,
        StatName::HighestWinStreak,
        StatName::TriplesCreated,
        StatName::MaxBoardStats,
        StatName::CoinsWasted,
        StatName::Rerolls,
        StatName::HeroPowerUsed,
        StatName::Freezes,
        StatName::MinionsBought,
        StatName::MinionsSold,
        StatName::EnemyMinionsKilled,
        StatName::EnemyHeroesKilled,
        StatName::PercentageOfBattlesGoingFirst,
        StatName::BattleLuck,
        StatName::NegativeBattleLuck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatName::TotalDamageDealtToMinions => "totalDamageDealtToMinions",
            StatName::TotalDamageTakenByMinions => "totalDamageTakenByMinions",
            StatName::TotalDamageDealtToHeroes => "totalDamageDealtToHeroes",
            StatName::MaxDamageDealtToHero => "maxDamageDealtToHero",
            StatName::HighestWinStreak => "highestWinStreak",
            StatName::TriplesCreated => "triplesCreated",
            StatName::MaxBoardStats => "maxBoardStats",
            StatName::CoinsWasted => "coinsWasted",
            StatName::Rerolls => "rerolls",
            StatName::HeroPowerUsed => "heroPowerUsed",
            StatName::Freezes => "freezes",
            StatName::MinionsBought => "minionsBought",
            StatName::MinionsSold => "minionsSold",
            StatName::EnemyMinionsKilled => "enemyMinionsKilled",
            StatName::EnemyHeroesKilled => "enemyHeroesKilled",
            StatName::PercentageOfBattlesGoingFirst => "percentageOfBattlesGoingFirst",
            StatName::BattleLuck => "battleLuck",
            StatName::NegativeBattleLuck => "negativeBattleLuck",
        }
    }

    /// Candidate value for this stat in one match.
    ///
    /// `NaN` means the stat is undefined for the match (missing main player,
    /// no battles), negative infinity comes out of a max over an empty series.
    /// Neither ever reaches the ledger.
    pub fn extract(&self, stats: &StatisticsPayload, request: &IngestionRequest) -> f64 {
        let main_player = request.main_player.as_ref();
        match self {
            StatName::TotalDamageDealtToMinions => {
                damage_excluding(&stats.total_minions_damage_dealt, request)
            }
            StatName::TotalDamageTakenByMinions => {
                damage_excluding(&stats.total_minions_damage_taken, request)
            }
            StatName::TotalDamageDealtToHeroes => hero_damage(stats).sum(),
            StatName::MaxDamageDealtToHero => max_series(hero_damage(stats)),
            StatName::HighestWinStreak => main_player
                .and_then(|p| p.highest_win_streak)
                .unwrap_or(f64::NAN),
            StatName::TriplesCreated => {
                main_player.map_or(f64::NAN, |p| p.triple_history.len() as f64)
            }
            StatName::MaxBoardStats => {
                max_series(stats.total_stats_over_turn.iter().map(|v| v.value))
            }
            StatName::CoinsWasted => sum_series(&stats.coins_wasted_over_turn),
            StatName::Rerolls => {
                let rerolls = sum_series(&stats.rerolls_over_turn);
                if request.main_player_card_id() == Some(INFINITE_TOKI_CARD_ID) {
                    rerolls - sum_series(&stats.main_player_hero_powers_over_turn)
                } else {
                    rerolls
                }
            }
            StatName::HeroPowerUsed => sum_series(&stats.main_player_hero_powers_over_turn),
            StatName::Freezes => sum_series(&stats.freezes_over_turn),
            StatName::MinionsBought => sum_series(&stats.minions_bought_over_turn),
            StatName::MinionsSold => sum_series(&stats.minions_sold_over_turn),
            StatName::EnemyMinionsKilled => stats.total_enemy_minions_killed,
            StatName::EnemyHeroesKilled => stats.total_enemy_heroes_killed,
            StatName::PercentageOfBattlesGoingFirst => {
                let (first, second) = stats.went_first_in_battle_over_turn.iter().fold(
                    (0u32, 0u32),
                    |(first, second), turn| match turn.value {
                        Some(true) => (first + 1, second),
                        Some(false) => (first, second + 1),
                        None => (first, second),
                    },
                );
                100.0 * f64::from(first) / f64::from(first + second)
            }
            StatName::BattleLuck => 100.0 * stats.luck_factor,
            StatName::NegativeBattleLuck => -100.0 * stats.luck_factor,
        }
    }
}

fn damage_excluding(
    per_card: &std::collections::BTreeMap<String, f64>,
    request: &IngestionRequest,
) -> f64 {
    let excluded = request.main_player_card_id();
    per_card
        .iter()
        .filter(|(card_id, _)| Some(card_id.as_str()) != excluded)
        .map(|(_, damage)| damage)
        .sum()
}

fn hero_damage(stats: &StatisticsPayload) -> impl Iterator<Item = f64> + '_ {
    stats
        .damage_to_enemy_hero_over_turn
        .iter()
        .filter(|turn| turn.value.enemy_hero() != Some(KELTHUZAD_CARD_ID))
        .map(|turn| turn.value.amount())
}

impl fmt::Display for StatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown stat name: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MainPlayer;
    use crate::stats::payload::{HeroDamage, TurnValue};
    use serde_json::json;

    fn request_with_player(card_id: &str) -> IngestionRequest {
        IngestionRequest {
            review_id: "R1".to_string(),
            main_player: Some(MainPlayer {
                card_id: card_id.to_string(),
                highest_win_streak: Some(6.0),
                triple_history: vec![json!({"turn": 4}), json!({"turn": 7})],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn series(values: &[f64]) -> Vec<TurnValue<f64>> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| TurnValue::new(i as u32 + 1, value))
            .collect()
    }

    fn hero_hit(enemy: &str, value: f64) -> TurnValue<HeroDamage> {
        TurnValue::new(
            1,
            HeroDamage::Detailed {
                enemy_hero_card_id: Some(enemy.to_string()),
                value,
                extra: Default::default(),
            },
        )
    }

    #[test]
    fn test_minion_damage_excludes_main_player() {
        let stats = StatisticsPayload {
            total_minions_damage_dealt: [("H1", 100.0), ("m1", 30.0), ("m2", 12.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            total_minions_damage_taken: [("H1", 9.0), ("m1", 4.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..Default::default()
        };
        let req = request_with_player("H1");
        assert_eq!(StatName::TotalDamageDealtToMinions.extract(&stats, &req), 42.0);
        assert_eq!(StatName::TotalDamageTakenByMinions.extract(&stats, &req), 4.0);
    }

    #[test]
    fn test_hero_damage_skips_kelthuzad() {
        let stats = StatisticsPayload {
            damage_to_enemy_hero_over_turn: vec![
                hero_hit("A", 5.0),
                hero_hit(KELTHUZAD_CARD_ID, 40.0),
                hero_hit("B", 11.0),
                TurnValue::new(9, HeroDamage::Legacy(3.0)),
            ],
            ..Default::default()
        };
        let req = request_with_player("H1");
        assert_eq!(StatName::TotalDamageDealtToHeroes.extract(&stats, &req), 19.0);
        assert_eq!(StatName::MaxDamageDealtToHero.extract(&stats, &req), 11.0);
    }

    #[test]
    fn test_max_of_empty_series_is_not_finite() {
        let stats = StatisticsPayload::default();
        let req = request_with_player("H1");
        assert!(!StatName::MaxDamageDealtToHero.extract(&stats, &req).is_finite());
        assert!(!StatName::MaxBoardStats.extract(&stats, &req).is_finite());
    }

    #[test]
    fn test_player_stats() {
        let stats = StatisticsPayload::default();
        let req = request_with_player("H1");
        assert_eq!(StatName::HighestWinStreak.extract(&stats, &req), 6.0);
        assert_eq!(StatName::TriplesCreated.extract(&stats, &req), 2.0);

        let anonymous = IngestionRequest::default();
        assert!(StatName::HighestWinStreak.extract(&stats, &anonymous).is_nan());
        assert!(StatName::TriplesCreated.extract(&stats, &anonymous).is_nan());
    }

    #[test]
    fn test_turn_series_sums_and_max() {
        let stats = StatisticsPayload {
            total_stats_over_turn: series(&[12.0, 88.0, 61.0]),
            coins_wasted_over_turn: series(&[1.0, 0.0, 2.0]),
            main_player_hero_powers_over_turn: series(&[1.0, 1.0]),
            freezes_over_turn: series(&[1.0, 1.0, 1.0]),
            minions_bought_over_turn: series(&[3.0, 4.0]),
            minions_sold_over_turn: series(&[2.0, 2.0]),
            total_enemy_minions_killed: 57.0,
            total_enemy_heroes_killed: 3.0,
            ..Default::default()
        };
        let req = request_with_player("H1");
        assert_eq!(StatName::MaxBoardStats.extract(&stats, &req), 88.0);
        assert_eq!(StatName::CoinsWasted.extract(&stats, &req), 3.0);
        assert_eq!(StatName::HeroPowerUsed.extract(&stats, &req), 2.0);
        assert_eq!(StatName::Freezes.extract(&stats, &req), 3.0);
        assert_eq!(StatName::MinionsBought.extract(&stats, &req), 7.0);
        assert_eq!(StatName::MinionsSold.extract(&stats, &req), 4.0);
        assert_eq!(StatName::EnemyMinionsKilled.extract(&stats, &req), 57.0);
        assert_eq!(StatName::EnemyHeroesKilled.extract(&stats, &req), 3.0);
    }

    #[test]
    fn test_rerolls_for_infinite_toki() {
        let stats = StatisticsPayload {
            rerolls_over_turn: series(&[3.0, 4.0, 5.0]),
            main_player_hero_powers_over_turn: series(&[1.0, 2.0]),
            ..Default::default()
        };
        assert_eq!(
            StatName::Rerolls.extract(&stats, &request_with_player("H1")),
            12.0
        );
        assert_eq!(
            StatName::Rerolls.extract(&stats, &request_with_player(INFINITE_TOKI_CARD_ID)),
            9.0
        );
    }

    #[test]
    fn test_percentage_going_first() {
        let turns = |values: &[Option<bool>]| {
            values
                .iter()
                .map(|&value| TurnValue::new(1, value))
                .collect::<Vec<_>>()
        };
        let req = request_with_player("H1");
        let stats = StatisticsPayload {
            went_first_in_battle_over_turn: turns(&[Some(true), Some(false), None, Some(true), Some(true)]),
            ..Default::default()
        };
        assert_eq!(
            StatName::PercentageOfBattlesGoingFirst.extract(&stats, &req),
            75.0
        );

        let no_battles = StatisticsPayload::default();
        assert!(StatName::PercentageOfBattlesGoingFirst
            .extract(&no_battles, &req)
            .is_nan());
    }

    #[test]
    fn test_battle_luck_is_signed() {
        let stats = StatisticsPayload {
            luck_factor: 0.25,
            ..Default::default()
        };
        let req = request_with_player("H1");
        assert_eq!(StatName::BattleLuck.extract(&stats, &req), 25.0);
        assert_eq!(StatName::NegativeBattleLuck.extract(&stats, &req), -25.0);
    }

    #[test]
    fn test_stat_name_round_trips_through_str() {
        for name in StatName::ALL {
            assert_eq!(name.as_str().parse::<StatName>().unwrap(), name);
            assert_eq!(
                serde_json::to_value(name).unwrap(),
                json!(name.as_str())
            );
        }
        assert!("notAStat".parse::<StatName>().is_err());
    }
}
