//! CSV loading for result tables, feature tables and startlists
//!
//! The historical observation table is produced by the upstream ingestion
//! step (one row per rider per race, snake_case columns). This module turns
//! it into typed [`Observation`]s, reads/writes the enriched feature table,
//! and reads startlists whose rider-name column goes by several names.

use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use crate::data::features::{FeatureRecord, PointsTier, TeamTier};
use crate::error::{Error, Result};
use crate::names;

/// One rider's result in one race.
///
/// Read-only once loaded; the feature builder never mutates observations,
/// it produces a parallel table of [`FeatureRecord`]s.
#[derive(Debug, Clone)]
pub struct Observation {
    pub rider_name: String,
    /// Canonical identity key from [`names::normalize`]; `None` when the raw
    /// name was empty.
    pub rider_key: Option<String>,
    pub race_id: String,
    pub race_date: NaiveDate,
    pub series: Option<String>,
    pub category: Option<String>,
    /// Finishing place; `None` for DNF/DNS/unparseable entries.
    pub place: Option<u32>,
    pub carried_points: Option<f64>,
    pub scored_points: Option<f64>,
    pub team: Option<String>,
    /// Original ingestion order. The stable tie-break when race dates
    /// collide: partitions sort by `(race_date, row)`.
    pub row: usize,
}

/// Startlist column synonyms across sources.
const RIDER_NAME_COLUMNS: [&str; 3] = ["rider_name", "Naam", "Name"];

/// Load the historical observation table.
pub fn load_observations<P: AsRef<Path>>(csv_path: P) -> Result<Vec<Observation>> {
    let df = read_csv(csv_path.as_ref())?;
    dataframe_to_observations(&df)
}

/// Load a startlist, accepting any of the known rider-name column synonyms.
pub fn load_startlist<P: AsRef<Path>>(csv_path: P) -> Result<Vec<String>> {
    let df = read_csv(csv_path.as_ref())?;

    let column = RIDER_NAME_COLUMNS
        .iter()
        .find(|c| df.column(c).is_ok())
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "startlist has no rider-name column (expected one of {:?})",
                RIDER_NAME_COLUMNS
            ))
        })?;

    let name_col = df.column(column)?.str()?;
    Ok(name_col
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Load an enriched feature table produced by [`write_feature_table`].
///
/// Returns the observations together with their aligned feature records.
pub fn load_feature_table<P: AsRef<Path>>(
    csv_path: P,
) -> Result<(Vec<Observation>, Vec<FeatureRecord>)> {
    let df = read_csv(csv_path.as_ref())?;
    let observations = dataframe_to_observations(&df)?;

    let f64_col = |name: &str| -> Result<Vec<Option<f64>>> { anynum_column(&df, name) };
    let count_col = |name: &str| -> Result<Vec<Option<i64>>> {
        Ok(anynum_column(&df, name)?.into_iter().map(|v| v.map(|v| v as i64)).collect())
    };

    let uci = f64_col("uci_points_normalized")?;
    let races = count_col("races_so_far")?;
    let avg3 = f64_col("avg_place_last3")?;
    let best5 = f64_col("best_place_last5")?;
    let last_place = f64_col("last_place")?;
    let days = f64_col("days_since_last_race")?;
    let last_carried = f64_col("last_carried_points")?;
    let last_scored = f64_col("last_scored_points")?;
    let top3 = f64_col("top3_rate_career")?;
    let top10 = f64_col("top10_rate_career")?;
    let series_app = count_col("series_appearances")?;
    let is_elite = count_col("is_elite")?;
    let is_women = count_col("is_women")?;
    let points_tier_col = df.column("points_tier")?.str()?;
    let team_tier_col = df.column("team_tier")?.str()?;

    let mut features = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        features.push(FeatureRecord {
            uci_points_normalized: uci[i].unwrap_or(0.0),
            races_so_far: races[i].unwrap_or(0).max(0) as u32,
            avg_place_last3: avg3[i],
            best_place_last5: best5[i],
            last_place: last_place[i],
            days_since_last_race: days[i],
            last_carried_points: last_carried[i],
            last_scored_points: last_scored[i],
            top3_rate_career: top3[i],
            top10_rate_career: top10[i],
            series_appearances: series_app[i].map(|v| v.max(0) as u32),
            is_elite: is_elite[i].unwrap_or(0) != 0,
            is_women: is_women[i].unwrap_or(0) != 0,
            points_tier: points_tier_col
                .get(i)
                .and_then(PointsTier::parse)
                .unwrap_or(PointsTier::Low),
            team_tier: team_tier_col
                .get(i)
                .and_then(TeamTier::parse)
                .unwrap_or(TeamTier::NoTeam),
        });
    }

    Ok((observations, features))
}

/// Write the enriched feature table: observation columns plus all derived
/// feature columns, aligned row for row.
///
/// The table is rebuilt wholesale on every call; callers overwrite the
/// target path in one shot rather than appending.
pub fn write_feature_table<P: AsRef<Path>>(
    path: P,
    observations: &[Observation],
    features: &[FeatureRecord],
) -> Result<()> {
    debug_assert_eq!(observations.len(), features.len());

    let date_str: Vec<String> = observations
        .iter()
        .map(|o| o.race_date.format("%Y-%m-%d").to_string())
        .collect();

    let mut df = DataFrame::new(vec![
        Column::new(
            "rider_name".into(),
            observations.iter().map(|o| o.rider_name.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "rider_key".into(),
            observations.iter().map(|o| o.rider_key.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "race_id".into(),
            observations.iter().map(|o| o.race_id.clone()).collect::<Vec<_>>(),
        ),
        Column::new("race_date".into(), date_str),
        Column::new(
            "series_name".into(),
            observations.iter().map(|o| o.series.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "category".into(),
            observations.iter().map(|o| o.category.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "place".into(),
            observations.iter().map(|o| o.place.map(|p| p as i64)).collect::<Vec<_>>(),
        ),
        Column::new(
            "carried_points".into(),
            observations.iter().map(|o| o.carried_points).collect::<Vec<_>>(),
        ),
        Column::new(
            "scored_points".into(),
            observations.iter().map(|o| o.scored_points).collect::<Vec<_>>(),
        ),
        Column::new(
            "team_name".into(),
            observations.iter().map(|o| o.team.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "uci_points_normalized".into(),
            features.iter().map(|f| f.uci_points_normalized).collect::<Vec<_>>(),
        ),
        Column::new(
            "races_so_far".into(),
            features.iter().map(|f| f.races_so_far as i64).collect::<Vec<_>>(),
        ),
        Column::new(
            "avg_place_last3".into(),
            features.iter().map(|f| f.avg_place_last3).collect::<Vec<_>>(),
        ),
        Column::new(
            "best_place_last5".into(),
            features.iter().map(|f| f.best_place_last5).collect::<Vec<_>>(),
        ),
        Column::new(
            "last_place".into(),
            features.iter().map(|f| f.last_place).collect::<Vec<_>>(),
        ),
        Column::new(
            "days_since_last_race".into(),
            features.iter().map(|f| f.days_since_last_race).collect::<Vec<_>>(),
        ),
        Column::new(
            "last_carried_points".into(),
            features.iter().map(|f| f.last_carried_points).collect::<Vec<_>>(),
        ),
        Column::new(
            "last_scored_points".into(),
            features.iter().map(|f| f.last_scored_points).collect::<Vec<_>>(),
        ),
        Column::new(
            "top3_rate_career".into(),
            features.iter().map(|f| f.top3_rate_career).collect::<Vec<_>>(),
        ),
        Column::new(
            "top10_rate_career".into(),
            features.iter().map(|f| f.top10_rate_career).collect::<Vec<_>>(),
        ),
        Column::new(
            "series_appearances".into(),
            features
                .iter()
                .map(|f| f.series_appearances.map(|v| v as i64))
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "is_elite".into(),
            features.iter().map(|f| f.is_elite as i64).collect::<Vec<_>>(),
        ),
        Column::new(
            "is_women".into(),
            features.iter().map(|f| f.is_women as i64).collect::<Vec<_>>(),
        ),
        Column::new(
            "points_tier".into(),
            features.iter().map(|f| f.points_tier.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "team_tier".into(),
            features.iter().map(|f| f.team_tier.as_str()).collect::<Vec<_>>(),
        ),
    ])?;

    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Convert a result-table DataFrame into typed observations.
///
/// Unparseable place/points cells become `None` and propagate as nulls
/// through feature derivation; a missing or unparseable race date is fatal
/// since every temporal feature depends on it.
fn dataframe_to_observations(df: &DataFrame) -> Result<Vec<Observation>> {
    let name_col = df.column("rider_name")?.str()?;
    let race_id_col = df.column("race_id")?.str()?;
    let date_col = df.column("race_date")?.str()?;
    let series_col = df.column("series_name")?.str()?;
    let category_col = df.column("category")?.str()?;
    let place_col = anynum_column(df, "place")?;
    let carried_col = anynum_column(df, "carried_points")?;
    let scored_col = anynum_column(df, "scored_points")?;
    let team_col = df.column("team_name")?.str()?;

    let mut observations = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let raw_name = name_col.get(i).unwrap_or("").to_string();
        let date_str = date_col
            .get(i)
            .ok_or_else(|| Error::InvalidInput(format!("row {}: missing race_date", i)))?;
        let race_date = parse_date(date_str).ok_or_else(|| {
            Error::InvalidInput(format!("row {}: bad race_date {:?}", i, date_str))
        })?;

        observations.push(Observation {
            rider_key: names::normalize(&raw_name),
            rider_name: raw_name,
            race_id: race_id_col.get(i).unwrap_or("").to_string(),
            race_date,
            series: non_empty(series_col.get(i)),
            category: non_empty(category_col.get(i)),
            place: place_col[i].filter(|p| *p > 0.0).map(|p| p as u32),
            carried_points: carried_col[i],
            scored_points: scored_col[i],
            team: non_empty(team_col.get(i)),
            row: i,
        });
    }

    Ok(observations)
}

/// Read a column that may have been inferred as i64, f64 or string.
fn anynum_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = df.column(name)?;
    let values = match col.dtype() {
        DataType::Float64 => col.f64()?.into_iter().collect(),
        DataType::Int64 => col.i64()?.into_iter().map(|v| v.map(|v| v as f64)).collect(),
        _ => col
            .str()?
            .into_iter()
            .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
            .collect(),
    };
    Ok(values)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
