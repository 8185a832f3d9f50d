//! Post-match statistics as produced by the replay parser.
//!
//! Only the fields the ledger and side effects read are typed. Everything
//! else the parser emits is kept verbatim in `extra` maps so a stored payload
//! decodes back to exactly what was written. The parser writes NaN as
//! `null`; typed numbers read such nulls back as NaN.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// What a JSON `null` reads as for a typed field.
pub trait NullValue {
    fn null_value() -> Self;
}

impl NullValue for f64 {
    fn null_value() -> Self {
        f64::NAN
    }
}

impl<T> NullValue for Option<T> {
    fn null_value() -> Self {
        None
    }
}

impl NullValue for HeroDamage {
    fn null_value() -> Self {
        HeroDamage::Legacy(f64::NAN)
    }
}

fn null_as<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + NullValue,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_else(T::null_value))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_amounts<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<f64>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(card_id, amount)| (card_id, amount.unwrap_or(f64::NAN)))
        .collect())
}

/// A value recorded for one turn of the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + NullValue"))]
pub struct TurnValue<T> {
    pub turn: u32,
    #[serde(deserialize_with = "null_as")]
    pub value: T,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<T> TurnValue<T> {
    pub fn new(turn: u32, value: T) -> Self {
        Self {
            turn,
            value,
            extra: Map::new(),
        }
    }
}

/// Damage dealt to an enemy hero during one turn.
///
/// Older parser output stored the bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeroDamage {
    #[serde(rename_all = "camelCase")]
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enemy_hero_card_id: Option<String>,
        #[serde(deserialize_with = "null_as")]
        value: f64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Legacy(f64),
}

impl HeroDamage {
    pub fn amount(&self) -> f64 {
        match self {
            HeroDamage::Detailed { value, .. } | HeroDamage::Legacy(value) => *value,
        }
    }

    pub fn enemy_hero(&self) -> Option<&str> {
        match self {
            HeroDamage::Detailed {
                enemy_hero_card_id, ..
            } => enemy_hero_card_id.as_deref(),
            HeroDamage::Legacy(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    #[serde(default)]
    pub won_percent: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleResult {
    pub turn: u32,
    #[serde(default)]
    pub simulation_result: Option<SimulationResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsPayload {
    #[serde(default, deserialize_with = "nullable_amounts")]
    pub total_minions_damage_dealt: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "nullable_amounts")]
    pub total_minions_damage_taken: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub damage_to_enemy_hero_over_turn: Vec<TurnValue<HeroDamage>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_stats_over_turn: Vec<TurnValue<f64>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub coins_wasted_over_turn: Vec<TurnValue<f64>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rerolls_over_turn: Vec<TurnValue<f64>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub main_player_hero_powers_over_turn: Vec<TurnValue<f64>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub freezes_over_turn: Vec<TurnValue<f64>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub minions_bought_over_turn: Vec<TurnValue<f64>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub minions_sold_over_turn: Vec<TurnValue<f64>>,
    #[serde(default, deserialize_with = "null_as")]
    pub total_enemy_minions_killed: f64,
    #[serde(default, deserialize_with = "null_as")]
    pub total_enemy_heroes_killed: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub went_first_in_battle_over_turn: Vec<TurnValue<Option<bool>>>,
    #[serde(default, deserialize_with = "null_as")]
    pub luck_factor: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hp_over_turn: BTreeMap<String, Vec<TurnValue<f64>>>,
    /// Board state after every turn. Append-only and by far the largest field.
    #[serde(default, deserialize_with = "null_as_default")]
    pub board_history: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub battle_result_history: Vec<BattleResult>,
    #[serde(default, alias = "oldMmr", skip_serializing_if = "Option::is_none")]
    pub previous_rating: Option<f64>,
    #[serde(default, alias = "newMmr", skip_serializing_if = "Option::is_none")]
    pub new_rating: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatisticsPayload {
    pub fn with_ratings(mut self, previous: Option<f64>, new: Option<f64>) -> Self {
        self.previous_rating = previous;
        self.new_rating = new;
        self
    }

    pub fn final_board(&self) -> Option<&Value> {
        self.board_history.last()
    }

    /// Copy of the payload with the board history cut down to its last entry.
    pub fn with_final_board_only(&self) -> Self {
        let mut truncated = self.clone();
        truncated.board_history = self.board_history.last().cloned().into_iter().collect();
        truncated
    }
}

pub(crate) fn sum_series(series: &[TurnValue<f64>]) -> f64 {
    series.iter().map(|v| v.value).sum()
}

/// Max over a series; an empty series yields negative infinity.
pub(crate) fn max_series(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "totalStatsOverTurn": [{"turn": 1, "value": 10.0}],
            "luckFactor": 0.25,
            "minionsBoughtOverTurn": [],
            "someFutureField": {"nested": [1, 2, 3]},
            "oldMmr": 6400
        });
        let payload: StatisticsPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.previous_rating, Some(6400.0));
        assert_eq!(payload.extra["someFutureField"], json!({"nested": [1, 2, 3]}));

        let again: StatisticsPayload =
            serde_json::from_value(serde_json::to_value(&payload).unwrap()).unwrap();
        assert_eq!(again, payload);
    }

    #[test]
    fn test_hero_damage_accepts_both_shapes() {
        let series: Vec<TurnValue<HeroDamage>> = serde_json::from_value(json!([
            {"turn": 3, "value": {"enemyHeroCardId": "TB_BaconShop_HERO_01", "value": 7}},
            {"turn": 4, "value": 5}
        ]))
        .unwrap();
        assert_eq!(series[0].value.amount(), 7.0);
        assert_eq!(series[0].value.enemy_hero(), Some("TB_BaconShop_HERO_01"));
        assert_eq!(series[1].value.amount(), 5.0);
        assert_eq!(series[1].value.enemy_hero(), None);
    }

    #[test]
    fn test_nulls_read_as_nan() {
        let payload: StatisticsPayload = serde_json::from_str(
            r#"{
                "luckFactor": null,
                "totalEnemyHeroesKilled": null,
                "totalMinionsDamageDealt": {"m1": null, "m2": 4},
                "coinsWastedOverTurn": [{"turn": 1, "value": null}, {"turn": 2, "value": 3}],
                "damageToEnemyHeroOverTurn": [{"turn": 1, "value": null}],
                "wentFirstInBattleOverTurn": [{"turn": 1, "value": null}],
                "boardHistory": null
            }"#,
        )
        .unwrap();
        assert!(payload.luck_factor.is_nan());
        assert!(payload.total_enemy_heroes_killed.is_nan());
        assert!(payload.total_minions_damage_dealt["m1"].is_nan());
        assert_eq!(payload.total_minions_damage_dealt["m2"], 4.0);
        assert!(payload.coins_wasted_over_turn[0].value.is_nan());
        assert_eq!(payload.coins_wasted_over_turn[1].value, 3.0);
        assert!(payload.damage_to_enemy_hero_over_turn[0].value.amount().is_nan());
        assert_eq!(payload.went_first_in_battle_over_turn[0].value, None);
        assert!(payload.board_history.is_empty());

        // and are written back as nulls
        let written = serde_json::to_value(&payload).unwrap();
        assert_eq!(written["luckFactor"], Value::Null);
        assert_eq!(written["coinsWastedOverTurn"][0]["value"], Value::Null);
    }

    #[test]
    fn test_parser_json_survives_round_trip_verbatim() {
        let raw = json!({
            "totalStatsOverTurn": [{"turn": 1, "value": 5.5, "attack": 3, "health": 2.5}],
            "damageToEnemyHeroOverTurn": [
                {"turn": 2, "value": {"enemyHeroCardId": "TB_BaconShop_HERO_01", "value": 7.0, "isKill": false}},
                {"turn": 3, "value": 4.0}
            ],
            "hpOverTurn": {"H1": [{"turn": 1, "value": 30.0, "armor": 5}]},
            "battleResultHistory": [
                {"turn": 2, "simulationResult": {"wonPercent": 55.5, "tiedPercent": 10.0}, "actualResult": "won"}
            ],
            "luckFactor": 0.5,
            "someFutureField": {"nested": [1, 2, 3]}
        });
        let payload: StatisticsPayload = serde_json::from_value(raw.clone()).unwrap();
        let written = serde_json::to_value(&payload).unwrap();
        for key in raw.as_object().unwrap().keys() {
            assert_eq!(written[key], raw[key], "field {}", key);
        }
    }

    #[test]
    fn test_final_board_only() {
        let payload = StatisticsPayload {
            board_history: vec![json!({"turn": 1}), json!({"turn": 2}), json!({"turn": 3})],
            ..Default::default()
        };
        let truncated = payload.with_final_board_only();
        assert_eq!(truncated.board_history, vec![json!({"turn": 3})]);
        assert!(StatisticsPayload::default()
            .with_final_board_only()
            .board_history
            .is_empty());
    }
}
