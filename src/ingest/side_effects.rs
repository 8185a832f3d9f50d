//! Pure decisions behind the post-merge writes on the match summary.

use serde::Serialize;

use crate::models::MatchSummary;
use crate::stats::StatisticsPayload;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnWinrate {
    pub turn: u32,
    pub winrate: Option<f64>,
}

/// A first place where the player's health never dropped below where it
/// started, over at least `min_turns` recorded turns.
pub fn is_perfect_game(summary: &MatchSummary, stats: &StatisticsPayload, min_turns: usize) -> bool {
    if !summary.is_first_place() {
        return false;
    }
    let Some(hp) = summary
        .player_card_id
        .as_ref()
        .and_then(|card_id| stats.hp_over_turn.get(card_id))
    else {
        return false;
    };
    if hp.len() < min_turns.max(1) {
        return false;
    }
    let starting_hp = hp[0].value;
    hp.iter().all(|turn| turn.value >= starting_hp)
}

pub fn combat_winrates(stats: &StatisticsPayload) -> Vec<TurnWinrate> {
    stats
        .battle_result_history
        .iter()
        .map(|battle| TurnWinrate {
            turn: battle.turn,
            winrate: battle
                .simulation_result
                .as_ref()
                .and_then(|result| result.won_percent),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::payload::{BattleResult, SimulationResult, TurnValue};

    fn summary(additional_result: &str) -> MatchSummary {
        MatchSummary {
            review_id: "R1".to_string(),
            game_mode: "battlegrounds".to_string(),
            replay_key: "R1.xml".to_string(),
            player_card_id: Some("H1".to_string()),
            additional_result: Some(additional_result.to_string()),
            user_id: None,
            user_name: None,
        }
    }

    fn stats_with_hp(hp: &[f64]) -> StatisticsPayload {
        StatisticsPayload {
            hp_over_turn: [(
                "H1".to_string(),
                hp.iter()
                    .enumerate()
                    .map(|(i, &value)| TurnValue::new(i as u32 + 1, value))
                    .collect(),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_perfect_game() {
        let full_health = stats_with_hp(&[40.0; 9]);
        assert!(is_perfect_game(&summary("1"), &full_health, 8));
        // not first place
        assert!(!is_perfect_game(&summary("2"), &full_health, 8));
        // too short
        assert!(!is_perfect_game(&summary("1"), &stats_with_hp(&[40.0; 7]), 8));
        // took damage at some point
        let mut hp = vec![40.0; 9];
        hp[4] = 33.0;
        assert!(!is_perfect_game(&summary("1"), &stats_with_hp(&hp), 8));
        // armor on top of the starting health is fine
        let mut hp = vec![40.0; 9];
        hp[8] = 45.0;
        assert!(is_perfect_game(&summary("1"), &stats_with_hp(&hp), 8));
    }

    #[test]
    fn test_perfect_game_needs_the_players_series() {
        let mut other_hero = summary("1");
        other_hero.player_card_id = Some("H2".to_string());
        assert!(!is_perfect_game(&other_hero, &stats_with_hp(&[40.0; 9]), 8));
    }

    #[test]
    fn test_combat_winrates() {
        let stats = StatisticsPayload {
            battle_result_history: vec![
                BattleResult {
                    turn: 2,
                    simulation_result: Some(SimulationResult {
                        won_percent: Some(61.5),
                        ..Default::default()
                    }),
                    extra: Default::default(),
                },
                BattleResult {
                    turn: 3,
                    simulation_result: None,
                    extra: Default::default(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            combat_winrates(&stats),
            vec![
                TurnWinrate {
                    turn: 2,
                    winrate: Some(61.5)
                },
                TurnWinrate {
                    turn: 3,
                    winrate: None
                },
            ]
        );
        assert_eq!(
            serde_json::to_string(&combat_winrates(&stats)).unwrap(),
            r#"[{"turn":2,"winrate":61.5},{"turn":3,"winrate":null}]"#
        );
    }
}
