//! Prediction Validation
//!
//! Compare a saved prediction file against the actual race result and
//! report accuracy, precision and podium agreement.

use serde::{Deserialize, Serialize};

use crate::data::csv_loader::Observation;
use crate::data::history::category_matches;
use crate::models::{Decision, PredictionRecord};
use crate::names::names_match;

/// Outcome of validating one race's predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub riders_scored: usize,
    pub predicted_top10: usize,
    pub actual_top10: usize,

    /// Share of the actual top 10 that was predicted.
    pub accuracy: f64,
    /// Share of predicted top-10 riders who actually finished top 10.
    pub precision: f64,

    pub correct: Vec<String>,
    /// Actual top-10 finishers the predictions missed.
    pub missed: Vec<String>,
    /// Predicted top-10 riders who finished outside.
    pub false_positives: Vec<String>,

    // Podium comparison
    pub podium_predicted: Vec<String>,
    pub podium_actual: Vec<String>,
    pub podium_hits: usize,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self {
            riders_scored: 0,
            predicted_top10: 0,
            actual_top10: 0,
            accuracy: 0.0,
            precision: 0.0,
            correct: Vec::new(),
            missed: Vec::new(),
            false_positives: Vec::new(),
            podium_predicted: Vec::new(),
            podium_actual: Vec::new(),
            podium_hits: 0,
        }
    }
}

/// Validate predictions against actual results for one category.
///
/// Matching is by normalized name with surname-first tolerance, since
/// prediction files come from startlists and results from organizer
/// exports that rarely agree on name order. An empty result set yields a
/// zeroed report rather than an error; validating before results are
/// published is a normal workflow.
pub fn validate(
    predictions: &[PredictionRecord],
    results: &[Observation],
    category: &str,
) -> ValidationReport {
    let actual: Vec<&Observation> = results
        .iter()
        .filter(|o| category_matches(o.category.as_deref(), category))
        .collect();

    let predicted_top10: Vec<&str> = predictions
        .iter()
        .filter(|p| p.decision == Decision::Top10)
        .map(|p| p.rider_name.as_str())
        .collect();

    let actual_top10: Vec<&str> = actual
        .iter()
        .filter(|o| o.place.map(|p| p <= 10).unwrap_or(false))
        .map(|o| o.rider_name.as_str())
        .collect();

    let mut report = ValidationReport {
        riders_scored: predictions.len(),
        predicted_top10: predicted_top10.len(),
        actual_top10: actual_top10.len(),
        ..Default::default()
    };

    for &name in &predicted_top10 {
        if contains_name(&actual_top10, name) {
            report.correct.push(name.to_string());
        } else {
            report.false_positives.push(name.to_string());
        }
    }
    for &name in &actual_top10 {
        if !contains_name(&predicted_top10, name) {
            report.missed.push(name.to_string());
        }
    }

    if !actual_top10.is_empty() {
        report.accuracy = report.correct.len() as f64 / actual_top10.len() as f64;
    }
    if !predicted_top10.is_empty() {
        report.precision = report.correct.len() as f64 / predicted_top10.len() as f64;
    }

    report.podium_predicted = predicted_podium(predictions);
    report.podium_actual = actual_podium(&actual);
    report.podium_hits = report
        .podium_predicted
        .iter()
        .filter(|p| contains_name_owned(&report.podium_actual, p))
        .count();

    report
}

/// Top three predictions by podium probability.
fn predicted_podium(predictions: &[PredictionRecord]) -> Vec<String> {
    let mut ranked: Vec<&PredictionRecord> = predictions.iter().collect();
    ranked.sort_by(|a, b| {
        b.top3_probability
            .partial_cmp(&a.top3_probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.iter().take(3).map(|p| p.rider_name.clone()).collect()
}

/// Actual podium in finishing order.
fn actual_podium(results: &[&Observation]) -> Vec<String> {
    let mut placed: Vec<&&Observation> =
        results.iter().filter(|o| o.place.is_some()).collect();
    placed.sort_by_key(|o| (o.place.unwrap_or(u32::MAX), o.row));
    placed.iter().take(3).map(|o| o.rider_name.clone()).collect()
}

fn contains_name(names: &[&str], candidate: &str) -> bool {
    names.iter().any(|n| names_match(n, candidate))
}

fn contains_name_owned(names: &[String], candidate: &str) -> bool {
    names.iter().any(|n| names_match(n, candidate))
}
