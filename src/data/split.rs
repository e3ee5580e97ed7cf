//! Chronological train/test splitting
//!
//! Classifier evaluation only means something on races strictly later
//! than anything trained on; a random split leaks future form into the
//! training set. The split here sorts the table by date and cuts once.

use crate::data::csv_loader::Observation;
use crate::error::{Error, Result};

/// Split observation positions chronologically: the earliest
/// `train_fraction` of rows becomes the training set, the rest the test
/// set. Rows are ordered by `(race_date, row)`, the same tie-break the
/// history index uses, so the cut is deterministic and no test-set race
/// date ever precedes a train-set date.
pub fn split_by_date(
    observations: &[Observation],
    train_fraction: f64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if train_fraction <= 0.0 || train_fraction >= 1.0 {
        return Err(Error::InvalidInput(format!(
            "train fraction must be in (0, 1), got {}",
            train_fraction
        )));
    }

    let mut order: Vec<usize> = (0..observations.len()).collect();
    order.sort_by_key(|&i| (observations[i].race_date, observations[i].row));

    let cut = (observations.len() as f64 * train_fraction).floor() as usize;
    let test = order.split_off(cut);
    Ok((order, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(name: &str, race_date: NaiveDate, row: usize) -> Observation {
        Observation {
            rider_name: name.to_string(),
            rider_key: crate::names::normalize(name),
            race_id: format!("race_{}", row),
            race_date,
            series: None,
            category: Some("Men Elite".to_string()),
            place: Some(5),
            carried_points: None,
            scored_points: None,
            team: None,
            row,
        }
    }

    fn unsorted_season() -> Vec<Observation> {
        // Ten races, deliberately out of date order.
        let days = [20, 5, 28, 1, 14, 9, 25, 3, 17, 11];
        days.iter()
            .enumerate()
            .map(|(row, &d)| {
                obs("A Rider", NaiveDate::from_ymd_opt(2024, 10, d).unwrap(), row)
            })
            .collect()
    }

    #[test]
    fn test_split_sizes() {
        let observations = unsorted_season();
        let (train, test) = split_by_date(&observations, 0.8).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert_eq!(train.len() + test.len(), observations.len());
    }

    #[test]
    fn test_no_test_date_precedes_a_train_date() {
        let observations = unsorted_season();
        let (train, test) = split_by_date(&observations, 0.7).unwrap();

        let latest_train = train.iter().map(|&i| observations[i].race_date).max().unwrap();
        let earliest_test = test.iter().map(|&i| observations[i].race_date).min().unwrap();
        assert!(latest_train <= earliest_test);
    }

    #[test]
    fn test_same_day_races_cut_by_ingestion_order() {
        let d = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let observations = vec![
            obs("A Rider", d, 0),
            obs("B Rider", d, 1),
            obs("C Rider", d, 2),
            obs("D Rider", d, 3),
        ];
        let (train, test) = split_by_date(&observations, 0.5).unwrap();
        assert_eq!(train, vec![0, 1]);
        assert_eq!(test, vec![2, 3]);
    }

    #[test]
    fn test_fraction_out_of_range_is_rejected() {
        let observations = unsorted_season();
        for bad in [0.0, 1.0, -0.2, 1.5] {
            assert!(matches!(
                split_by_date(&observations, bad),
                Err(Error::InvalidInput(_))
            ));
        }
    }
}
