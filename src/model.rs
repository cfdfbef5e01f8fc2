//! Baseline consumption model, train/test split and evaluation metrics.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::table::{Reading, ReadingTable};

/// Rows held out for testing: roughly the last year of hourly data.
pub const DEFAULT_TEST_ROWS: usize = 8_670;

pub const CONSUMPTION_UNIT: &str = "kWh";

const MONTHS: usize = 12;
const WEEKDAYS: usize = 7;
const HOURS: usize = 24;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("training set has no rows with a known total consumption")]
    EmptyTrainingSet,
    #[error("invalid model input: {0}")]
    InvalidInput(String),
}

/// Feature vector accepted by the prediction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "Day")]
    pub day: u32,
    #[serde(rename = "Hour")]
    pub hour: u32,
    #[serde(rename = "Weekday")]
    pub weekday: u32,
    #[serde(rename = "Corona")]
    pub corona: u8,
    #[serde(rename = "Holiday")]
    pub holiday: u8,
    #[serde(rename = "Vacation")]
    pub vacation: u8,
    #[serde(rename = "Hr")]
    pub humidity: f64,
    #[serde(rename = "RainDur")]
    pub rain_duration: f64,
    #[serde(rename = "StrGlo")]
    pub solar_irradiance: f64,
    #[serde(rename = "T")]
    pub temperature: f64,
    #[serde(rename = "WD")]
    pub wind_direction: f64,
    #[serde(rename = "WVs")]
    pub wind_speed_scalar: f64,
    #[serde(rename = "WVv")]
    pub wind_speed_vector: f64,
    #[serde(rename = "p")]
    pub air_pressure: f64,
}

impl ModelInput {
    /// `None` when the reading still has a gap in any model column.
    pub fn from_reading(reading: &Reading) -> Option<Self> {
        let features = reading.features?;
        let values = &reading.values;
        Some(Self {
            year: features.year,
            month: features.month,
            day: features.day,
            hour: features.hour,
            weekday: features.weekday,
            corona: features.corona,
            holiday: values.holiday?,
            vacation: values.vacation?,
            humidity: values.humidity?,
            rain_duration: values.rain_duration?,
            solar_irradiance: values.solar_irradiance?,
            temperature: values.temperature?,
            wind_direction: values.wind_direction?,
            wind_speed_scalar: values.wind_speed_scalar?,
            wind_speed_vector: values.wind_speed_vector?,
            air_pressure: values.air_pressure?,
        })
    }
}

/// Prediction response. `Default` is the failure sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub p: f64,
    pub unit: String,
    pub model_name: String,
    pub model_version: i64,
}

impl Default for ModelOutput {
    fn default() -> Self {
        Self {
            p: 0.0,
            unit: CONSUMPTION_UNIT.to_string(),
            model_name: "fail".to_string(),
            model_version: -1,
        }
    }
}

pub trait Predictor: Send + Sync + 'static {
    fn predict(&self, input: &ModelInput) -> Result<f64, ModelError>;
}

/// Mean total consumption per (month, weekday, hour), falling back to the
/// hourly mean and then the global mean for buckets unseen in training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketMeanModel {
    calendar_means: Vec<Option<f64>>,
    hourly_means: Vec<Option<f64>>,
    global_mean: f64,
    training_rows: usize,
}

impl BucketMeanModel {
    pub fn fit(table: &ReadingTable) -> Result<Self, ModelError> {
        let mut calendar = vec![(0.0, 0usize); MONTHS * WEEKDAYS * HOURS];
        let mut hourly = vec![(0.0, 0usize); HOURS];
        let mut total = (0.0, 0usize);

        for row in &table.rows {
            let Some(target) = row.total_consumption else {
                continue;
            };
            let features = row.calendar();
            if let Some(slot) = calendar_slot(features.month, features.weekday, features.hour) {
                calendar[slot].0 += target;
                calendar[slot].1 += 1;
            }
            if let Some(hour) = hourly.get_mut(features.hour as usize) {
                hour.0 += target;
                hour.1 += 1;
            }
            total.0 += target;
            total.1 += 1;
        }

        if total.1 == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let model = Self {
            calendar_means: calendar.into_iter().map(mean_of).collect(),
            hourly_means: hourly.into_iter().map(mean_of).collect(),
            global_mean: total.0 / total.1 as f64,
            training_rows: total.1,
        };

        info!(
            component = "model",
            event = "model.fit.finish",
            training_rows = model.training_rows,
            populated_buckets = model.calendar_means.iter().flatten().count(),
            global_mean = model.global_mean
        );

        Ok(model)
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }
}

impl Predictor for BucketMeanModel {
    fn predict(&self, input: &ModelInput) -> Result<f64, ModelError> {
        let slot = calendar_slot(input.month, input.weekday, input.hour).ok_or_else(|| {
            ModelError::InvalidInput(format!(
                "month={} weekday={} hour={} outside calendar range",
                input.month, input.weekday, input.hour
            ))
        })?;

        let prediction = self
            .calendar_means
            .get(slot)
            .copied()
            .flatten()
            .or_else(|| {
                self.hourly_means
                    .get(input.hour as usize)
                    .copied()
                    .flatten()
            })
            .unwrap_or(self.global_mean);
        Ok(prediction)
    }
}

fn calendar_slot(month: u32, weekday: u32, hour: u32) -> Option<usize> {
    if !(1..=12).contains(&month) || !(1..=7).contains(&weekday) || hour > 23 {
        return None;
    }
    let month = month as usize - 1;
    let weekday = weekday as usize - 1;
    Some((month * WEEKDAYS + weekday) * HOURS + hour as usize)
}

fn mean_of((sum, count): (f64, usize)) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Holds out the last `test_rows` rows. A shorter table is all test data.
pub fn split_train_test(table: &ReadingTable, test_rows: usize) -> (ReadingTable, ReadingTable) {
    let split_at = table.len().saturating_sub(test_rows);
    let (train, test) = table.rows.split_at(split_at);
    (table.with_rows(train.to_vec()), table.with_rows(test.to_vec()))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mae: f64,
    pub mse: f64,
    pub r2: f64,
    pub mape: f64,
}

pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> Result<EvaluationMetrics, ModelError> {
    if y_true.len() != y_pred.len() {
        return Err(ModelError::InvalidInput(format!(
            "length mismatch: {} targets vs {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ModelError::InvalidInput(
            "cannot evaluate an empty test set".to_string(),
        ));
    }

    let n = y_true.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    for (t, p) in y_true.iter().zip(y_pred) {
        let err = t - p;
        abs_sum += err.abs();
        sq_sum += err * err;
        pct_sum += err.abs() / t.abs().max(f64::EPSILON);
    }

    let mean = y_true.iter().sum::<f64>() / n;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();
    let r2 = if ss_tot == 0.0 {
        if sq_sum == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - sq_sum / ss_tot
    };

    Ok(EvaluationMetrics {
        mae: abs_sum / n,
        mse: sq_sum / n,
        r2,
        mape: pct_sum / n,
    })
}

/// Scores `predictor` on every test row with a known target and complete inputs.
pub fn evaluate_on_table(
    predictor: &dyn Predictor,
    test: &ReadingTable,
) -> Result<EvaluationMetrics, ModelError> {
    let mut y_true = Vec::with_capacity(test.len());
    let mut y_pred = Vec::with_capacity(test.len());
    let mut skipped = 0usize;

    for row in &test.rows {
        let (Some(target), Some(input)) = (row.total_consumption, ModelInput::from_reading(row))
        else {
            skipped += 1;
            continue;
        };
        y_true.push(target);
        y_pred.push(predictor.predict(&input)?);
    }

    if skipped > 0 {
        warn!(
            component = "model",
            event = "model.evaluate.rows_skipped",
            skipped,
            evaluated = y_true.len()
        );
    }

    evaluate(&y_true, &y_pred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CalendarFeatures;
    use crate::table::Measurements;
    use chrono::NaiveDate;

    fn row(day: u32, hour: u32, total: Option<f64>) -> Reading {
        let ts = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Reading {
            timestamp: ts,
            values: Measurements::default(),
            features: Some(CalendarFeatures::from_timestamp(ts)),
            total_consumption: total,
        }
    }

    fn input(month: u32, weekday: u32, hour: u32) -> ModelInput {
        ModelInput {
            year: 2024,
            month,
            day: 1,
            hour,
            weekday,
            corona: 0,
            holiday: 0,
            vacation: 0,
            humidity: 70.0,
            rain_duration: 0.0,
            solar_irradiance: 0.0,
            temperature: 4.0,
            wind_direction: 180.0,
            wind_speed_scalar: 1.0,
            wind_speed_vector: 1.0,
            air_pressure: 965.0,
        }
    }

    #[test]
    fn predicts_bucket_then_hour_then_global_mean() {
        // 2024-01-01 and 2024-01-08 are Mondays.
        let table = ReadingTable::new(vec![
            row(1, 8, Some(100.0)),
            row(8, 8, Some(200.0)),
            row(2, 9, Some(400.0)),
            row(3, 10, None),
        ]);
        let model = BucketMeanModel::fit(&table).unwrap();

        assert_eq!(model.training_rows(), 3);
        assert_eq!(model.predict(&input(1, 1, 8)).unwrap(), 150.0);
        // Unseen (month, weekday) but the hour is known.
        assert_eq!(model.predict(&input(6, 3, 8)).unwrap(), 150.0);
        // Unseen hour falls back to the global mean.
        let global = (100.0 + 200.0 + 400.0) / 3.0;
        assert!((model.predict(&input(1, 1, 23)).unwrap() - global).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_calendar_inputs() {
        let model = BucketMeanModel::fit(&ReadingTable::new(vec![row(1, 0, Some(1.0))])).unwrap();
        assert!(matches!(
            model.predict(&input(13, 1, 0)),
            Err(ModelError::InvalidInput(_))
        ));
        assert!(model.predict(&input(1, 0, 0)).is_err());
        assert!(model.predict(&input(1, 1, 24)).is_err());
    }

    #[test]
    fn fit_requires_a_target() {
        let table = ReadingTable::new(vec![row(1, 0, None)]);
        assert_eq!(
            BucketMeanModel::fit(&table).unwrap_err(),
            ModelError::EmptyTrainingSet
        );
    }

    #[test]
    fn split_holds_out_the_tail() {
        let table = ReadingTable::new((0..10).map(|h| row(1, h, Some(h as f64))).collect());
        let (train, test) = split_train_test(&table, 3);
        assert_eq!(train.len(), 7);
        assert_eq!(test.len(), 3);
        assert_eq!(test.rows[0].total_consumption, Some(7.0));

        let (train, test) = split_train_test(&table, DEFAULT_TEST_ROWS);
        assert!(train.is_empty());
        assert_eq!(test.len(), 10);
    }

    #[test]
    fn metrics_follow_regression_conventions() {
        let metrics = evaluate(&[100.0, 200.0, 300.0], &[110.0, 190.0, 300.0]).unwrap();
        assert!((metrics.mae - 20.0 / 3.0).abs() < 1e-9);
        assert!((metrics.mse - 200.0 / 3.0).abs() < 1e-9);
        assert!((metrics.r2 - (1.0 - 200.0 / 20_000.0)).abs() < 1e-9);
        assert!((metrics.mape - (0.1 + 0.05) / 3.0).abs() < 1e-9);

        let perfect = evaluate(&[5.0, 5.0], &[5.0, 5.0]).unwrap();
        assert_eq!(perfect.r2, 1.0);

        assert!(evaluate(&[1.0], &[]).is_err());
        assert!(evaluate(&[], &[]).is_err());
    }

    #[test]
    fn sentinel_output_marks_failure() {
        let out = ModelOutput::default();
        assert_eq!(out.p, 0.0);
        assert_eq!(out.unit, "kWh");
        assert_eq!(out.model_name, "fail");
        assert_eq!(out.model_version, -1);
    }

    #[test]
    fn model_input_uses_endpoint_field_names() {
        let json = serde_json::to_value(input(3, 2, 14)).unwrap();
        assert_eq!(json["Month"], 3);
        assert_eq!(json["Weekday"], 2);
        assert_eq!(json["Hr"], 70.0);
        assert_eq!(json["p"], 965.0);
    }
}
