//! Startlist scoring
//!
//! Projects each startlist rider's historical profile onto an upcoming
//! race, assembles the model input vector and turns classifier
//! probabilities into decisions. Profile construction is deliberately
//! separate from inference so the reconstruction rules can be tested
//! without ONNX runtimes in the loop.

use chrono::{Datelike, NaiveDate};
use tracing::info;

use crate::assembler::assemble;
use crate::bundle::ModelBundle;
use crate::data::csv_loader::Observation;
use crate::data::features::{
    categorical_specs, FeatureConfig, FeatureMap, FeatureRecord, PointsTier, TeamTier,
};
use crate::data::history::RiderHistoryIndex;
use crate::error::{Error, Result};
use crate::models::{Decision, PredictionRecord, RiderStatus};
use crate::names;

/// Days without racing before a rider is flagged as a doubtful starter.
const MAX_DAYS_WITHOUT_RACE: i64 = 21;
/// Minimum current-season race count to avoid the doubtful-starter flag.
const MIN_SEASON_RACES: usize = 2;
/// Cyclocross seasons start on August 1st.
const SEASON_START_MONTH: u32 = 8;

/// A rider's reconstructed pre-race profile.
#[derive(Debug, Clone)]
pub struct RiderProfile {
    pub features: FeatureMap,
    pub status: RiderStatus,
    pub dns_risk: bool,
    pub recent_form: Option<f64>,
    pub career_top10_rate: Option<f64>,
}

/// Scores startlists against a historical feature table.
#[derive(Debug)]
pub struct Predictor<'a> {
    observations: &'a [Observation],
    features: &'a [FeatureRecord],
    index: RiderHistoryIndex,
    config: FeatureConfig,
}

impl<'a> Predictor<'a> {
    pub fn new(
        observations: &'a [Observation],
        features: &'a [FeatureRecord],
        config: FeatureConfig,
    ) -> Result<Self> {
        if observations.len() != features.len() {
            return Err(Error::InvalidInput(format!(
                "{} observations but {} feature records",
                observations.len(),
                features.len()
            )));
        }
        let index = RiderHistoryIndex::build(observations);
        Ok(Self { observations, features, index, config })
    }

    /// Score a whole startlist, returned sorted by Top-10 probability
    /// descending.
    pub fn predict_startlist(
        &self,
        riders: &[String],
        category: &str,
        as_of: NaiveDate,
        bundle: &mut ModelBundle,
        threshold: f64,
        dns_filter: bool,
    ) -> Result<Vec<PredictionRecord>> {
        let mut predictions = Vec::with_capacity(riders.len());
        for rider in riders {
            predictions.push(self.predict(rider, category, as_of, bundle, threshold, dns_filter)?);
        }
        predictions.sort_by(|a, b| {
            b.top10_probability
                .partial_cmp(&a.top10_probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(predictions)
    }

    /// Score one rider.
    pub fn predict(
        &self,
        rider_name: &str,
        category: &str,
        as_of: NaiveDate,
        bundle: &mut ModelBundle,
        threshold: f64,
        dns_filter: bool,
    ) -> Result<PredictionRecord> {
        let profile = self.profile(rider_name, category, as_of);

        let vector = assemble(
            &profile.features,
            &bundle.metadata.features,
            &bundle.metadata.fill_values,
            &categorical_specs(),
        );
        let probs = bundle.predict_proba(&vector)?;

        let decision = label(probs.top10, threshold, profile.dns_risk, dns_filter);

        Ok(PredictionRecord {
            rider_name: rider_name.to_string(),
            top10_probability: probs.top10,
            top3_probability: probs.top3,
            decision,
            status: profile.status,
            dns_risk: profile.dns_risk,
            recent_form: profile.recent_form,
            career_top10_rate: profile.career_top10_rate,
        })
    }

    /// Reconstruct a rider's profile for an upcoming race in `category`,
    /// dated `as_of`.
    ///
    /// A rider counts as found only with a history that passes the loose
    /// category match (see [`crate::data::history::category_matches`]).
    /// The doubtful-starter flag applies to found riders only, since an
    /// unseen rider carries no gap to measure.
    pub fn profile(&self, rider_name: &str, category: &str, as_of: NaiveDate) -> RiderProfile {
        match self.locate(rider_name, category) {
            Some((key, located)) => self.found_profile(&key, category, as_of, located),
            None => {
                info!(rider = rider_name, category, "no matching history, treating as new rider");
                self.new_rider_profile(category)
            }
        }
    }

    /// Latest category-matching observation for the rider, trying the
    /// normalized key and then its token-reversed form for startlists
    /// printed surname-first. Returns the key that matched.
    fn locate(&self, rider_name: &str, category: &str) -> Option<(String, usize)> {
        let key = names::normalize(rider_name)?;
        if let Some(i) = self.index.latest_in_category(self.observations, &key, category) {
            return Some((key, i));
        }
        let reversed = names::reversed_key(&key)?;
        self.index
            .latest_in_category(self.observations, &reversed, category)
            .map(|i| (reversed, i))
    }

    /// Project the located observation's derived features onto the
    /// upcoming race: that race is now part of the rider's past, so its
    /// actual place and points become the `last_*` features, the race
    /// count bumps by one, and the gap is assumed to be a week of regular
    /// racing. Window and career-rate features stay as derived; with a
    /// single-race history they remain null and take the trained fill
    /// values at assembly.
    fn found_profile(
        &self,
        key: &str,
        category: &str,
        as_of: NaiveDate,
        located: usize,
    ) -> RiderProfile {
        let obs = &self.observations[located];
        let mut record = self.features[located].clone();

        record.races_so_far += 1;
        record.days_since_last_race = Some(self.config.assumed_race_gap_days);
        record.last_place = obs.place.map(|p| p as f64);
        record.last_carried_points = obs.carried_points;
        record.last_scored_points = obs.scored_points;
        // The upcoming race's series is unknown at prediction time.
        record.series_appearances = Some(0);
        record.is_elite = marker_matches(category, &self.config.elite_marker);
        record.is_women = marker_matches(category, &self.config.women_marker);

        let recent_form = record.avg_place_last3;
        let career_top10_rate = record.top10_rate_career;
        let dns_risk = self.doubtful_starter(key, obs.race_date, as_of);

        RiderProfile {
            features: record.to_map(),
            status: RiderStatus::Found,
            dns_risk,
            recent_form,
            career_top10_rate,
        }
    }

    fn new_rider_profile(&self, category: &str) -> RiderProfile {
        let default_place = self.config.median_place_default;
        let record = FeatureRecord {
            uci_points_normalized: self.config.new_rider_points_normalized,
            races_so_far: 0,
            avg_place_last3: Some(default_place),
            best_place_last5: Some(default_place),
            last_place: Some(default_place),
            days_since_last_race: Some(self.config.new_rider_gap_days),
            last_carried_points: Some(0.0),
            last_scored_points: Some(0.0),
            top3_rate_career: Some(0.0),
            top10_rate_career: Some(0.0),
            series_appearances: Some(0),
            is_elite: marker_matches(category, &self.config.elite_marker),
            is_women: marker_matches(category, &self.config.women_marker),
            points_tier: PointsTier::Low,
            team_tier: TeamTier::NoTeam,
        };

        RiderProfile {
            features: record.to_map(),
            status: RiderStatus::NewRider,
            dns_risk: false,
            recent_form: None,
            career_top10_rate: None,
        }
    }

    /// Doubtful-starter heuristic: a long gap since the last matching
    /// race, or too few races this season across all categories. A label
    /// override only; probabilities are never adjusted by it.
    fn doubtful_starter(&self, key: &str, last_race: NaiveDate, as_of: NaiveDate) -> bool {
        if (as_of - last_race).num_days() > MAX_DAYS_WITHOUT_RACE {
            return true;
        }
        let season_start = season_start(as_of);
        self.index.races_between(self.observations, key, season_start, as_of) < MIN_SEASON_RACES
    }
}

/// Label for one rider. The doubtful-starter override wins when enabled;
/// otherwise a Top-10 call requires the probability to strictly exceed the
/// threshold.
fn label(top10_probability: f64, threshold: f64, dns_risk: bool, dns_filter: bool) -> Decision {
    if dns_filter && dns_risk {
        Decision::DnsRisk
    } else if top10_probability > threshold {
        Decision::Top10
    } else {
        Decision::OutsideTop10
    }
}

/// First day of the season containing `date`.
fn season_start(date: NaiveDate) -> NaiveDate {
    let year = if date.month() >= SEASON_START_MONTH {
        date.year()
    } else {
        date.year() - 1
    };
    // August 1st always exists.
    NaiveDate::from_ymd_opt(year, SEASON_START_MONTH, 1).unwrap_or(date)
}

fn marker_matches(category: &str, marker: &str) -> bool {
    category.to_lowercase().contains(&marker.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::FeatureValue;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(
        name: &str,
        race_date: NaiveDate,
        place: Option<u32>,
        category: &str,
        row: usize,
    ) -> Observation {
        Observation {
            rider_name: name.to_string(),
            rider_key: crate::names::normalize(name),
            race_id: format!("race_{}", row),
            race_date,
            series: Some("X2O".to_string()),
            category: Some(category.to_string()),
            place,
            carried_points: Some(180.0),
            scored_points: Some(20.0),
            team: Some("Alpecin-Deceuninck".to_string()),
            row,
        }
    }

    fn predictor_fixture(observations: &[Observation]) -> (Vec<FeatureRecord>, FeatureConfig) {
        let config = FeatureConfig::default();
        let builder = crate::data::features::FeatureBuilder::new(config.clone());
        (builder.build(observations), config)
    }

    fn numeric(map: &FeatureMap, name: &str) -> Option<f64> {
        match map.get(name) {
            Some(FeatureValue::Numeric(v)) => *v,
            _ => panic!("missing numeric feature {}", name),
        }
    }

    #[test]
    fn test_found_profile_projects_latest_observation() {
        let observations = vec![
            obs("Eli Iserbyt", date(2024, 10, 6), Some(5), "Men Elite", 0),
            obs("Eli Iserbyt", date(2024, 10, 13), Some(2), "Men Elite", 1),
            obs("Eli Iserbyt", date(2024, 10, 20), Some(1), "Men Elite", 2),
        ];
        let (features, config) = predictor_fixture(&observations);
        let predictor = Predictor::new(&observations, &features, config).unwrap();

        let profile = predictor.profile("Eli Iserbyt", "Men Elite", date(2024, 10, 27));
        assert_eq!(profile.status, RiderStatus::Found);
        assert!(!profile.dns_risk);

        // Located observation's derived record had races_so_far = 2.
        assert_eq!(numeric(&profile.features, "races_so_far"), Some(3.0));
        // Windows stay as derived at the located race (its own place
        // excluded): mean of 5 and 2.
        assert_eq!(numeric(&profile.features, "avg_place_last3"), Some(3.5));
        // Its actual result becomes the last-race features.
        assert_eq!(numeric(&profile.features, "last_place"), Some(1.0));
        assert_eq!(numeric(&profile.features, "last_carried_points"), Some(180.0));
        assert_eq!(numeric(&profile.features, "days_since_last_race"), Some(7.0));
        assert_eq!(numeric(&profile.features, "series_appearances"), Some(0.0));
        assert_eq!(numeric(&profile.features, "top3_rate_career"), Some(0.5));
        assert_eq!(numeric(&profile.features, "top10_rate_career"), Some(1.0));
        assert_eq!(profile.recent_form, Some(3.5));
        assert_eq!(profile.career_top10_rate, Some(1.0));
    }

    #[test]
    fn test_single_race_history_keeps_null_windows() {
        let observations = vec![obs("Eli Iserbyt", date(2024, 10, 6), Some(5), "Men Elite", 0)];
        let (features, config) = predictor_fixture(&observations);
        let predictor = Predictor::new(&observations, &features, config).unwrap();

        let profile = predictor.profile("Eli Iserbyt", "Men Elite", date(2024, 10, 13));
        assert_eq!(profile.status, RiderStatus::Found);
        assert_eq!(numeric(&profile.features, "races_so_far"), Some(1.0));
        // Nulls survive into the map; the assembler fills them later.
        assert_eq!(numeric(&profile.features, "avg_place_last3"), None);
        assert_eq!(numeric(&profile.features, "top10_rate_career"), None);
        assert_eq!(numeric(&profile.features, "last_place"), Some(5.0));
    }

    #[test]
    fn test_unseen_rider_gets_defaults() {
        let observations = vec![obs("Eli Iserbyt", date(2024, 10, 6), Some(5), "Men Elite", 0)];
        let (features, config) = predictor_fixture(&observations);
        let predictor = Predictor::new(&observations, &features, config).unwrap();

        let profile = predictor.profile("Totally Unknown", "Women Elite", date(2024, 10, 27));
        assert_eq!(profile.status, RiderStatus::NewRider);
        assert!(!profile.dns_risk);
        assert_eq!(numeric(&profile.features, "races_so_far"), Some(0.0));
        assert_eq!(numeric(&profile.features, "avg_place_last3"), Some(25.0));
        assert_eq!(numeric(&profile.features, "uci_points_normalized"), Some(0.1));
        assert_eq!(numeric(&profile.features, "is_women"), Some(1.0));
        assert_eq!(numeric(&profile.features, "is_elite"), Some(1.0));
        assert_eq!(profile.recent_form, None);
    }

    #[test]
    fn test_wrong_category_history_counts_as_new() {
        // "women" never appears in the men's labels, so the lookup misses.
        let observations = vec![
            obs("Pim Ronhaar", date(2024, 10, 6), Some(1), "Men Elite", 0),
        ];
        let (features, config) = predictor_fixture(&observations);
        let predictor = Predictor::new(&observations, &features, config).unwrap();

        let profile = predictor.profile("Pim Ronhaar", "Women Elite", date(2024, 10, 27));
        assert_eq!(profile.status, RiderStatus::NewRider);
    }

    #[test]
    fn test_label_requires_probability_above_threshold() {
        // Exactly at the threshold stays outside.
        assert_eq!(label(0.5, 0.5, false, false), Decision::OutsideTop10);
        assert_eq!(label(0.51, 0.5, false, false), Decision::Top10);
        assert_eq!(label(0.49, 0.5, false, false), Decision::OutsideTop10);
    }

    #[test]
    fn test_label_dns_override_only_when_enabled() {
        assert_eq!(label(0.9, 0.5, true, true), Decision::DnsRisk);
        assert_eq!(label(0.9, 0.5, true, false), Decision::Top10);
        assert_eq!(label(0.2, 0.5, true, true), Decision::DnsRisk);
        assert_eq!(label(0.2, 0.5, false, true), Decision::OutsideTop10);
    }

    #[test]
    fn test_reversed_startlist_name_is_found() {
        let observations = vec![
            obs("Thibau Nys", date(2024, 10, 6), Some(3), "Men Elite", 0),
            obs("Thibau Nys", date(2024, 10, 13), Some(1), "Men Elite", 1),
        ];
        let (features, config) = predictor_fixture(&observations);
        let predictor = Predictor::new(&observations, &features, config).unwrap();

        let profile = predictor.profile("Nys Thibau", "Men Elite", date(2024, 10, 20));
        assert_eq!(profile.status, RiderStatus::Found);
        assert_eq!(numeric(&profile.features, "races_so_far"), Some(2.0));
    }

    #[test]
    fn test_long_gap_flags_doubtful_starter() {
        let observations = vec![
            obs("A Rider", date(2024, 9, 1), Some(4), "Men Elite", 0),
            obs("A Rider", date(2024, 9, 8), Some(6), "Men Elite", 1),
        ];
        let (features, config) = predictor_fixture(&observations);
        let predictor = Predictor::new(&observations, &features, config).unwrap();

        // 21 days exactly is fine; longer is not.
        let ok = predictor.profile("A Rider", "Men Elite", date(2024, 9, 29));
        assert!(!ok.dns_risk);
        let flagged = predictor.profile("A Rider", "Men Elite", date(2024, 11, 15));
        assert!(flagged.dns_risk);
    }

    #[test]
    fn test_thin_season_flags_doubtful_starter() {
        // Active last season, only one race this season, recent enough.
        let observations = vec![
            obs("A Rider", date(2024, 1, 14), Some(4), "Men Elite", 0),
            obs("A Rider", date(2024, 1, 21), Some(6), "Men Elite", 1),
            obs("A Rider", date(2024, 10, 6), Some(9), "Men Elite", 2),
        ];
        let (features, config) = predictor_fixture(&observations);
        let predictor = Predictor::new(&observations, &features, config).unwrap();

        let profile = predictor.profile("A Rider", "Men Elite", date(2024, 10, 13));
        assert!(profile.dns_risk);
    }

    #[test]
    fn test_season_start_rollover() {
        assert_eq!(season_start(date(2024, 10, 1)), date(2024, 8, 1));
        assert_eq!(season_start(date(2025, 1, 15)), date(2024, 8, 1));
        assert_eq!(season_start(date(2024, 8, 1)), date(2024, 8, 1));
        assert_eq!(season_start(date(2024, 7, 31)), date(2023, 8, 1));
    }

    #[test]
    fn test_mismatched_table_lengths_rejected() {
        let observations = vec![obs("A Rider", date(2024, 10, 6), Some(5), "Men Elite", 0)];
        let err = Predictor::new(&observations, &[], FeatureConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
