//! Feature vector assembly
//!
//! Turns a name-keyed feature record into the flat `f32`-ready vector the
//! classifiers consume, reproducing the training-time encoding exactly:
//! drop-first one-hot expansion of the tier categoricals, per-column fill
//! values for nulls, and column order taken verbatim from the model
//! metadata rather than from any local convention.

use std::collections::HashMap;

use crate::data::features::{CategoricalSpec, FeatureMap, FeatureValue};

/// Assemble a feature record into model input order.
///
/// `expected` is the trained column list from the model metadata and is
/// the sole authority on both membership and order. Columns the record
/// does not produce become 0.0, which is also how one-hot columns for
/// unobserved levels come out, so an unknown categorical level degrades
/// to the dropped base level instead of failing.
pub fn assemble(
    record: &FeatureMap,
    expected: &[String],
    fills: &HashMap<String, f64>,
    categoricals: &[CategoricalSpec],
) -> Vec<f64> {
    let mut columns: HashMap<String, f64> = HashMap::with_capacity(expected.len());

    for (name, value) in record {
        match value {
            FeatureValue::Numeric(v) => {
                let filled = v.unwrap_or_else(|| fills.get(name).copied().unwrap_or(0.0));
                columns.insert(name.clone(), filled);
            }
            FeatureValue::Categorical(level) => {
                let Some(spec) = categoricals.iter().find(|s| s.name == name) else {
                    continue;
                };
                // Drop-first: the base level is encoded as all-zeros.
                for candidate in &spec.values[1..] {
                    let indicator = if candidate == level { 1.0 } else { 0.0 };
                    columns.insert(format!("{}_{}", name, candidate), indicator);
                }
            }
        }
    }

    expected
        .iter()
        .map(|name| columns.get(name).copied().unwrap_or(0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::{
        categorical_specs, expanded_feature_names, FeatureRecord, PointsTier, TeamTier,
    };

    fn sample_record() -> FeatureRecord {
        FeatureRecord {
            uci_points_normalized: 0.4,
            races_so_far: 6,
            avg_place_last3: Some(4.0),
            best_place_last5: Some(1.0),
            last_place: Some(3.0),
            days_since_last_race: Some(7.0),
            last_carried_points: Some(120.0),
            last_scored_points: Some(30.0),
            top3_rate_career: Some(0.5),
            top10_rate_career: Some(0.9),
            series_appearances: Some(2),
            is_elite: true,
            is_women: false,
            points_tier: PointsTier::Mid,
            team_tier: TeamTier::TopTeam,
        }
    }

    #[test]
    fn test_vector_follows_expected_order() {
        let expected = expanded_feature_names();
        let vector = assemble(
            &sample_record().to_map(),
            &expected,
            &HashMap::new(),
            &categorical_specs(),
        );

        assert_eq!(vector.len(), expected.len());
        let at = |name: &str| vector[expected.iter().position(|n| n == name).unwrap()];
        assert!((at("uci_points_normalized") - 0.4).abs() < 1e-9);
        assert!((at("races_so_far") - 6.0).abs() < 1e-9);
        assert!((at("is_elite") - 1.0).abs() < 1e-9);
        assert!((at("is_women") - 0.0).abs() < 1e-9);
        assert!((at("points_tier_mid") - 1.0).abs() < 1e-9);
        assert!((at("points_tier_high") - 0.0).abs() < 1e-9);
        assert!((at("team_tier_top_team") - 1.0).abs() < 1e-9);
        assert!((at("team_tier_other_team") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_nulls_take_configured_fills() {
        let mut record = sample_record();
        record.avg_place_last3 = None;
        record.days_since_last_race = None;
        record.top3_rate_career = None;

        let mut fills = HashMap::new();
        fills.insert("avg_place_last3".to_string(), 25.0);
        fills.insert("days_since_last_race".to_string(), 14.0);

        let expected = expanded_feature_names();
        let vector = assemble(&record.to_map(), &expected, &fills, &categorical_specs());
        let at = |name: &str| vector[expected.iter().position(|n| n == name).unwrap()];

        assert!((at("avg_place_last3") - 25.0).abs() < 1e-9);
        assert!((at("days_since_last_race") - 14.0).abs() < 1e-9);
        // Nulls without a configured fill fall back to zero.
        assert!((at("top3_rate_career") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_base_categorical_levels_encode_as_zeros() {
        let mut record = sample_record();
        record.points_tier = PointsTier::Low;
        record.team_tier = TeamTier::NoTeam;

        let expected = expanded_feature_names();
        let vector = assemble(&record.to_map(), &expected, &HashMap::new(), &categorical_specs());
        let at = |name: &str| vector[expected.iter().position(|n| n == name).unwrap()];

        assert_eq!(at("points_tier_mid"), 0.0);
        assert_eq!(at("points_tier_high"), 0.0);
        assert_eq!(at("team_tier_other_team"), 0.0);
        assert_eq!(at("team_tier_top_team"), 0.0);
    }

    #[test]
    fn test_columns_absent_from_record_are_zero() {
        let mut map = sample_record().to_map();
        map.remove("races_so_far");
        map.remove("team_tier");

        let expected = expanded_feature_names();
        let vector = assemble(&map, &expected, &HashMap::new(), &categorical_specs());
        let at = |name: &str| vector[expected.iter().position(|n| n == name).unwrap()];

        assert_eq!(at("races_so_far"), 0.0);
        assert_eq!(at("team_tier_top_team"), 0.0);
    }

    #[test]
    fn test_output_independent_of_map_iteration_order() {
        // Same record assembled twice must be identical even though
        // HashMap iteration order is unspecified.
        let expected = expanded_feature_names();
        let a = assemble(&sample_record().to_map(), &expected, &HashMap::new(), &categorical_specs());
        let b = assemble(&sample_record().to_map(), &expected, &HashMap::new(), &categorical_specs());
        assert_eq!(a, b);
    }
}
