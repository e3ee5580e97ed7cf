//! Shared prediction output types.

use serde::{Deserialize, Serialize};

/// Whether a startlist rider could be matched to the historical data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiderStatus {
    Found,
    NewRider,
}

/// The headline call made for one rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "Top-10")]
    Top10,
    #[serde(rename = "Outside Top-10")]
    OutsideTop10,
    #[serde(rename = "DNS Risk")]
    DnsRisk,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Top10 => "Top-10",
            Decision::OutsideTop10 => "Outside Top-10",
            Decision::DnsRisk => "DNS Risk",
        }
    }
}

/// One scored startlist rider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub rider_name: String,
    pub top10_probability: f64,
    pub top3_probability: f64,
    pub decision: Decision,
    pub status: RiderStatus,
    /// Set when the start-likelihood heuristic fired. Kept separately from
    /// `decision` so downstream consumers can re-rank without re-scoring.
    pub dns_risk: bool,
    /// Rolling average place over the last three races, when known.
    pub recent_form: Option<f64>,
    pub career_top10_rate: Option<f64>,
}
