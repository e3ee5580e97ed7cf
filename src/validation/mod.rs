//! Post-race validation of saved predictions.

pub mod metrics;

pub use metrics::{validate, ValidationReport};

use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{Decision, PredictionRecord, RiderStatus};

/// Write a prediction file, one row per startlist rider.
pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    predictions: &[PredictionRecord],
) -> Result<()> {
    let mut df = DataFrame::new(vec![
        Column::new(
            "rider_name".into(),
            predictions.iter().map(|p| p.rider_name.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "top10_probability".into(),
            predictions.iter().map(|p| p.top10_probability).collect::<Vec<_>>(),
        ),
        Column::new(
            "top3_probability".into(),
            predictions.iter().map(|p| p.top3_probability).collect::<Vec<_>>(),
        ),
        Column::new(
            "prediction".into(),
            predictions.iter().map(|p| p.decision.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "status".into(),
            predictions
                .iter()
                .map(|p| match p.status {
                    RiderStatus::Found => "found",
                    RiderStatus::NewRider => "new_rider",
                })
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "dns_risk".into(),
            predictions.iter().map(|p| p.dns_risk as i64).collect::<Vec<_>>(),
        ),
        Column::new(
            "recent_form".into(),
            predictions.iter().map(|p| p.recent_form).collect::<Vec<_>>(),
        ),
        Column::new(
            "career_top10_rate".into(),
            predictions.iter().map(|p| p.career_top10_rate).collect::<Vec<_>>(),
        ),
    ])?;

    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

/// Reload a prediction file written by [`write_predictions`].
pub fn load_predictions<P: AsRef<Path>>(path: P) -> Result<Vec<PredictionRecord>> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?;

    let names = df.column("rider_name")?.str()?;
    let top10 = float_column(&df, "top10_probability")?;
    let top3 = float_column(&df, "top3_probability")?;
    let decisions = df.column("prediction")?.str()?;
    let statuses = df.column("status")?.str()?;
    let dns = float_column(&df, "dns_risk")?;
    let form = float_column(&df, "recent_form")?;
    let career = float_column(&df, "career_top10_rate")?;

    let mut predictions = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let decision = match decisions.get(i) {
            Some("Top-10") => Decision::Top10,
            Some("Outside Top-10") => Decision::OutsideTop10,
            Some("DNS Risk") => Decision::DnsRisk,
            other => {
                return Err(Error::InvalidInput(format!(
                    "row {}: unknown prediction label {:?}",
                    i, other
                )))
            }
        };
        let status = match statuses.get(i) {
            Some("new_rider") => RiderStatus::NewRider,
            _ => RiderStatus::Found,
        };

        predictions.push(PredictionRecord {
            rider_name: names.get(i).unwrap_or("").to_string(),
            top10_probability: top10[i].unwrap_or(0.0),
            top3_probability: top3[i].unwrap_or(0.0),
            decision,
            status,
            dns_risk: dns[i].map(|v| v != 0.0).unwrap_or(false),
            recent_form: form[i],
            career_top10_rate: career[i],
        });
    }

    Ok(predictions)
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<PredictionRecord> {
        vec![
            PredictionRecord {
                rider_name: "Eli Iserbyt".to_string(),
                top10_probability: 0.91,
                top3_probability: 0.62,
                decision: Decision::Top10,
                status: RiderStatus::Found,
                dns_risk: false,
                recent_form: Some(3.3),
                career_top10_rate: Some(0.88),
            },
            PredictionRecord {
                rider_name: "New Talent".to_string(),
                top10_probability: 0.12,
                top3_probability: 0.03,
                decision: Decision::OutsideTop10,
                status: RiderStatus::NewRider,
                dns_risk: false,
                recent_form: None,
                career_top10_rate: None,
            },
        ]
    }

    #[test]
    fn test_prediction_file_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("velopredict_{}_predictions.csv", std::process::id()));
        write_predictions(&path, &sample()).unwrap();
        let loaded = load_predictions(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].rider_name, "Eli Iserbyt");
        assert_eq!(loaded[0].decision, Decision::Top10);
        assert!((loaded[0].top10_probability - 0.91).abs() < 1e-9);
        assert_eq!(loaded[1].status, RiderStatus::NewRider);
        assert_eq!(loaded[1].recent_form, None);

        std::fs::remove_file(path).ok();
    }
}
