//! Feature engineering over rider race histories
//!
//! Derives the per-observation feature table the classifiers were trained
//! on: rolling form windows, career rates, UCI-points signals and the tier
//! categoricals. The single most important property here is lookahead
//! safety: the features attached to a rider's k-th race are computed from
//! races 1..k-1 only, never from the race itself or anything later.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::csv_loader::Observation;
use crate::data::history::RiderHistoryIndex;
use crate::data::window::{Expanding, Trailing};

/// Carried-points bucket, {low: [0,50), mid: [50,150), high: [150,inf)}.
/// Missing points count as 0 and land in `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsTier {
    Low,
    Mid,
    High,
}

impl PointsTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointsTier::Low => "low",
            PointsTier::Mid => "mid",
            PointsTier::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(PointsTier::Low),
            "mid" => Some(PointsTier::Mid),
            "high" => Some(PointsTier::High),
            _ => None,
        }
    }
}

/// Team bucket from substring matching against the curated elite-team
/// roster. An acknowledged-approximate heuristic, kept configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamTier {
    NoTeam,
    OtherTeam,
    TopTeam,
}

impl TeamTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamTier::NoTeam => "no_team",
            TeamTier::OtherTeam => "other_team",
            TeamTier::TopTeam => "top_team",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_team" => Some(TeamTier::NoTeam),
            "other_team" => Some(TeamTier::OtherTeam),
            "top_team" => Some(TeamTier::TopTeam),
            _ => None,
        }
    }
}

/// Tunable feature-derivation heuristics.
///
/// The roster fragments, tier thresholds and default fill constants are
/// configuration data, not compiled-in logic, so they can be updated
/// without touching the derivation code. `Default` reproduces the values
/// the shipped models were trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Uppercase name fragments identifying elite cyclocross teams.
    pub top_team_fragments: Vec<String>,
    /// Lower bound of the `mid` points tier.
    pub points_tier_mid: f64,
    /// Lower bound of the `high` points tier.
    pub points_tier_high: f64,
    /// Category-label substring marking elite races.
    pub elite_marker: String,
    /// Category-label substring marking women's races.
    pub women_marker: String,
    /// Place default for riders with no usable history.
    pub median_place_default: f64,
    /// `uci_points_normalized` for unseen riders: low but deliberately
    /// non-zero.
    pub new_rider_points_normalized: f64,
    /// Assumed days since last race for unseen riders.
    pub new_rider_gap_days: f64,
    /// Assumed inter-race gap when projecting a known rider onto an
    /// upcoming race (weekly racing).
    pub assumed_race_gap_days: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            top_team_fragments: [
                "ALPECIN",
                "DECEUNINCK",
                "BALOISE",
                "TREK",
                "LIONS",
                "PAUWELS",
                "SAUZEN",
                "CRELAN",
                "CORENDON",
                "VISMA",
                "LEASE",
                "BIKE",
                "INTERMARCHE",
                "CIRCUS",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            points_tier_mid: 50.0,
            points_tier_high: 150.0,
            elite_marker: "Elite".to_string(),
            women_marker: "Women".to_string(),
            median_place_default: 25.0,
            new_rider_points_normalized: 0.1,
            new_rider_gap_days: 14.0,
            assumed_race_gap_days: 7.0,
        }
    }
}

impl FeatureConfig {
    pub fn points_tier(&self, carried: f64) -> PointsTier {
        if carried >= self.points_tier_high {
            PointsTier::High
        } else if carried >= self.points_tier_mid {
            PointsTier::Mid
        } else {
            PointsTier::Low
        }
    }

    pub fn team_tier(&self, team: Option<&str>) -> TeamTier {
        match team {
            None => TeamTier::NoTeam,
            Some(name) => {
                let upper = name.to_uppercase();
                if self.top_team_fragments.iter().any(|f| upper.contains(f)) {
                    TeamTier::TopTeam
                } else {
                    TeamTier::OtherTeam
                }
            }
        }
    }
}

/// Derived features for one observation.
///
/// History-dependent fields are `None` when the rider has no strictly-prior
/// observations; the builder never substitutes defaults, so training-time
/// diagnostics can distinguish "unknown" from "known to be zero". Defaults
/// are applied only at assembly time.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub uci_points_normalized: f64,
    /// Zero-based count of strictly-prior observations.
    pub races_so_far: u32,
    pub avg_place_last3: Option<f64>,
    pub best_place_last5: Option<f64>,
    pub last_place: Option<f64>,
    pub days_since_last_race: Option<f64>,
    pub last_carried_points: Option<f64>,
    pub last_scored_points: Option<f64>,
    pub top3_rate_career: Option<f64>,
    pub top10_rate_career: Option<f64>,
    /// `None` when the observation has no series name.
    pub series_appearances: Option<u32>,
    pub is_elite: bool,
    pub is_women: bool,
    pub points_tier: PointsTier,
    pub team_tier: TeamTier,
}

/// A feature value as seen by the assembler: nullable numeric or a
/// categorical level awaiting one-hot expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Numeric(Option<f64>),
    Categorical(String),
}

/// Name-keyed feature record. Assembly reads this by name, so the map's
/// insertion order can never influence the output vector.
pub type FeatureMap = HashMap<String, FeatureValue>;

impl FeatureRecord {
    pub fn to_map(&self) -> FeatureMap {
        let mut map = FeatureMap::new();
        let mut num = |name: &str, v: Option<f64>| {
            map.insert(name.to_string(), FeatureValue::Numeric(v));
        };

        num("uci_points_normalized", Some(self.uci_points_normalized));
        num("races_so_far", Some(self.races_so_far as f64));
        num("avg_place_last3", self.avg_place_last3);
        num("best_place_last5", self.best_place_last5);
        num("last_place", self.last_place);
        num("days_since_last_race", self.days_since_last_race);
        num("last_carried_points", self.last_carried_points);
        num("last_scored_points", self.last_scored_points);
        num("top3_rate_career", self.top3_rate_career);
        num("top10_rate_career", self.top10_rate_career);
        num("series_appearances", self.series_appearances.map(|v| v as f64));
        num("is_elite", Some(self.is_elite as u8 as f64));
        num("is_women", Some(self.is_women as u8 as f64));

        map.insert(
            "points_tier".to_string(),
            FeatureValue::Categorical(self.points_tier.as_str().to_string()),
        );
        map.insert(
            "team_tier".to_string(),
            FeatureValue::Categorical(self.team_tier.as_str().to_string()),
        );
        map
    }
}

/// Numeric feature names in training order.
pub fn numeric_feature_names() -> [&'static str; 13] {
    [
        "uci_points_normalized",
        "races_so_far",
        "avg_place_last3",
        "best_place_last5",
        "last_place",
        "days_since_last_race",
        "last_carried_points",
        "last_scored_points",
        "top3_rate_career",
        "top10_rate_career",
        "series_appearances",
        "is_elite",
        "is_women",
    ]
}

/// A categorical feature and its level order. The first level is the one
/// dropped by drop-first encoding.
#[derive(Debug, Clone)]
pub struct CategoricalSpec {
    pub name: &'static str,
    pub values: Vec<&'static str>,
}

/// The two tier categoricals with their canonical level order.
pub fn categorical_specs() -> Vec<CategoricalSpec> {
    vec![
        CategoricalSpec { name: "points_tier", values: vec!["low", "mid", "high"] },
        CategoricalSpec { name: "team_tier", values: vec!["no_team", "other_team", "top_team"] },
    ]
}

/// Full expanded column list in training order: numerics followed by the
/// drop-first indicator columns.
pub fn expanded_feature_names() -> Vec<String> {
    let mut names: Vec<String> = numeric_feature_names().iter().map(|s| s.to_string()).collect();
    for spec in categorical_specs() {
        for value in &spec.values[1..] {
            names.push(format!("{}_{}", spec.name, value));
        }
    }
    names
}

/// Builds the feature table for a complete observation set.
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Derive features for every observation, aligned by index.
    ///
    /// Observations are partitioned by normalized rider key and walked in
    /// `(race_date, row)` order; all history state is pushed only after
    /// the current observation's features are read, which is what enforces
    /// the strict-past invariant. Rows without a rider key get a
    /// first-race record (no history is attributable to them).
    pub fn build(&self, observations: &[Observation]) -> Vec<FeatureRecord> {
        let index = RiderHistoryIndex::build(observations);

        // Dataset-wide constant, computed once: the normalization
        // denominator for carried points.
        let max_points = observations
            .iter()
            .filter_map(|o| o.carried_points)
            .fold(0.0_f64, f64::max);

        let mut records: Vec<FeatureRecord> = observations
            .iter()
            .map(|o| self.observation_record(o, max_points))
            .collect();

        let avg3 = Trailing::new(3, 1);
        let best5 = Trailing::new(5, 1);

        for (_, indices) in index.partitions() {
            let mut prior_places: Vec<Option<f64>> = Vec::with_capacity(indices.len());
            let mut prior_top3: Vec<Option<f64>> = Vec::with_capacity(indices.len());
            let mut prior_top10: Vec<Option<f64>> = Vec::with_capacity(indices.len());
            let mut series_counts: HashMap<&str, u32> = HashMap::new();
            let mut prev: Option<&Observation> = None;

            for (k, &i) in indices.iter().enumerate() {
                let obs = &observations[i];
                let rec = &mut records[i];

                rec.races_so_far = k as u32;
                rec.avg_place_last3 = avg3.mean(&prior_places);
                rec.best_place_last5 = best5.min(&prior_places);
                rec.top3_rate_career = Expanding::mean(&prior_top3);
                rec.top10_rate_career = Expanding::mean(&prior_top10);

                if let Some(p) = prev {
                    rec.last_place = p.place.map(|v| v as f64);
                    rec.last_carried_points = p.carried_points;
                    rec.last_scored_points = p.scored_points;
                    rec.days_since_last_race =
                        Some((obs.race_date - p.race_date).num_days() as f64);
                }

                rec.series_appearances = obs
                    .series
                    .as_deref()
                    .map(|s| series_counts.get(s).copied().unwrap_or(0));

                // Current observation joins the rider's past only now.
                prior_places.push(obs.place.map(|v| v as f64));
                prior_top3.push(Some(top_indicator(obs.place, 3)));
                prior_top10.push(Some(top_indicator(obs.place, 10)));
                if let Some(s) = obs.series.as_deref() {
                    *series_counts.entry(s).or_insert(0) += 1;
                }
                prev = Some(obs);
            }
        }

        records
    }

    /// Features readable from the observation row itself (no history).
    fn observation_record(&self, obs: &Observation, max_points: f64) -> FeatureRecord {
        let carried = obs.carried_points.unwrap_or(0.0);
        let uci_points_normalized = if max_points > 0.0 {
            (carried / max_points).clamp(0.0, 1.0)
        } else {
            0.0
        };

        FeatureRecord {
            uci_points_normalized,
            races_so_far: 0,
            avg_place_last3: None,
            best_place_last5: None,
            last_place: None,
            days_since_last_race: None,
            last_carried_points: None,
            last_scored_points: None,
            top3_rate_career: None,
            top10_rate_career: None,
            series_appearances: None,
            is_elite: contains_ci(obs.category.as_deref(), &self.config.elite_marker),
            is_women: contains_ci(obs.category.as_deref(), &self.config.women_marker),
            points_tier: self.config.points_tier(carried),
            team_tier: self.config.team_tier(obs.team.as_deref()),
        }
    }
}

/// Binary indicator for "finished at or inside `cutoff`". A missing place
/// counts as 0, not null: DNFs lower the career rates rather than shrink
/// their denominator.
fn top_indicator(place: Option<u32>, cutoff: u32) -> f64 {
    match place {
        Some(p) if p <= cutoff => 1.0,
        _ => 0.0,
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}
