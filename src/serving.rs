//! HTTP prediction endpoint.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{ModelInput, ModelOutput, Predictor, CONSUMPTION_UNIT};

/// A loaded model plus the registry coordinates it was loaded from.
#[derive(Clone)]
pub struct PredictionService {
    predictor: Arc<dyn Predictor>,
    model_name: String,
    model_version: i64,
}

impl PredictionService {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        model_name: impl Into<String>,
        model_version: i64,
    ) -> Self {
        Self {
            predictor,
            model_name: model_name.into(),
            model_version,
        }
    }

    /// Never fails: any prediction error becomes the sentinel output.
    pub fn predict(&self, input: &ModelInput) -> ModelOutput {
        match self.predictor.predict(input) {
            Ok(p) => {
                info!(
                    component = "serving",
                    event = "http.predict.ok",
                    model_name = %self.model_name,
                    model_version = self.model_version,
                    prediction = p
                );
                ModelOutput {
                    p,
                    unit: CONSUMPTION_UNIT.to_string(),
                    model_name: self.model_name.clone(),
                    model_version: self.model_version,
                }
            }
            Err(err) => {
                warn!(
                    component = "serving",
                    event = "http.predict.failed",
                    model_name = %self.model_name,
                    model_version = self.model_version,
                    error = %err
                );
                ModelOutput::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_name: String,
    pub model_version: i64,
}

pub fn prediction_router(service: PredictionService) -> Router {
    Router::new()
        .route("/predict/", post(post_predict))
        .route("/health", get(get_health))
        .with_state(service)
}

async fn post_predict(
    State(service): State<PredictionService>,
    Json(input): Json<ModelInput>,
) -> Json<ModelOutput> {
    Json(service.predict(&input))
}

async fn get_health(State(service): State<PredictionService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_name: service.model_name.clone(),
        model_version: service.model_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;

    struct Fixed(Result<f64, ModelError>);

    impl Predictor for Fixed {
        fn predict(&self, _input: &ModelInput) -> Result<f64, ModelError> {
            self.0.clone()
        }
    }

    fn input() -> ModelInput {
        serde_json::from_value(serde_json::json!({
            "Year": 2024, "Month": 1, "Day": 1, "Hour": 0, "Weekday": 1,
            "Corona": 0, "Holiday": 1, "Vacation": 1,
            "Hr": 80.0, "RainDur": 0, "StrGlo": 0.0, "T": 1.5,
            "WD": 200.0, "WVs": 2.0, "WVv": 1.0, "p": 960.0
        }))
        .unwrap()
    }

    #[test]
    fn successful_prediction_carries_model_coordinates() {
        let service = PredictionService::new(Arc::new(Fixed(Ok(42.5))), "BucketMean", 3);
        let out = service.predict(&input());
        assert_eq!(out.p, 42.5);
        assert_eq!(out.unit, "kWh");
        assert_eq!(out.model_name, "BucketMean");
        assert_eq!(out.model_version, 3);
    }

    #[test]
    fn failing_prediction_returns_sentinel() {
        let service = PredictionService::new(
            Arc::new(Fixed(Err(ModelError::InvalidInput("boom".to_string())))),
            "BucketMean",
            3,
        );
        assert_eq!(service.predict(&input()), ModelOutput::default());
    }
}
