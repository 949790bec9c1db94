use crate::error::{FeatureError, Result};
use crate::features::FeatureFrame;
use crate::models::{TargetFamily, IS_CONSUMPTION, ROW_ID, TARGET};
use log::info;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Anything that can learn `features -> target`. Gradient-boosting backends
/// plug in here.
pub trait Regressor {
    fn fit(&mut self, features: &DataFrame, target: &[f64]) -> Result<()>;
    fn predict(&self, features: &DataFrame) -> Result<Vec<f64>>;
}

/// What the regressors are trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTransform {
    Raw,
    /// Target minus its own lag; the lag is added back at prediction time.
    Residual { lag_hours: i64 },
}

/// Predicts the mean of the training target.
#[derive(Debug, Clone, Default)]
pub struct MeanRegressor {
    mean: Option<f64>,
}

impl MeanRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> Option<f64> {
        self.mean
    }
}

impl Regressor for MeanRegressor {
    fn fit(&mut self, _features: &DataFrame, target: &[f64]) -> Result<()> {
        self.mean = if target.is_empty() {
            None
        } else {
            Some(target.iter().sum::<f64>() / target.len() as f64)
        };
        Ok(())
    }

    fn predict(&self, features: &DataFrame) -> Result<Vec<f64>> {
        Ok(vec![self.mean.unwrap_or(0.0); features.height()])
    }
}

/// One regressor for consumption rows and one for production rows.
pub struct ForecastModel<R: Regressor> {
    consumption: R,
    production: R,
    transform: TargetTransform,
}

impl<R: Regressor> ForecastModel<R> {
    pub fn new(consumption: R, production: R, transform: TargetTransform) -> Self {
        Self {
            consumption,
            production,
            transform,
        }
    }

    pub fn transform(&self) -> TargetTransform {
        self.transform
    }

    /// Trains both regressors. Rows without a known target are skipped.
    pub fn fit(&mut self, frame: &FeatureFrame) -> Result<()> {
        let target = training_target(frame, self.transform)?;
        let is_consumption = consumption_flags(frame)?;

        for consumption in [true, false] {
            let mut mask = Vec::with_capacity(frame.height());
            let mut labels = Vec::new();
            for (idx, value) in target.iter().enumerate() {
                let selected = is_consumption[idx] == consumption && value.is_some();
                mask.push(selected);
                if let (true, Some(v)) = (selected, value) {
                    labels.push(*v);
                }
            }
            let mask = BooleanChunked::from_slice("mask".into(), &mask);
            let subset = frame.features.filter(&mask)?;
            info!(
                "fitting {} regressor on {} rows",
                if consumption { "consumption" } else { "production" },
                labels.len()
            );
            let regressor = if consumption {
                &mut self.consumption
            } else {
                &mut self.production
            };
            regressor.fit(&subset, &labels)?;
        }
        Ok(())
    }

    /// Non-negative predictions, in the frame's row order.
    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<f64>> {
        let is_consumption = consumption_flags(frame)?;
        let baseline = match self.transform {
            TargetTransform::Raw => vec![0.0; frame.height()],
            TargetTransform::Residual { lag_hours } => lag_values(frame, lag_hours)?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect(),
        };

        let mut predictions = vec![0.0; frame.height()];
        for consumption in [true, false] {
            let positions: Vec<usize> = (0..frame.height())
                .filter(|&idx| is_consumption[idx] == consumption)
                .collect();
            if positions.is_empty() {
                continue;
            }
            let mask: Vec<bool> = is_consumption.iter().map(|&c| c == consumption).collect();
            let mask = BooleanChunked::from_slice("mask".into(), &mask);
            let subset = frame.features.filter(&mask)?;
            let regressor = if consumption {
                &self.consumption
            } else {
                &self.production
            };
            let raw = regressor.predict(&subset)?;
            if raw.len() != positions.len() {
                return Err(FeatureError::InvalidConfig(format!(
                    "regressor returned {} predictions for {} rows",
                    raw.len(),
                    positions.len()
                )));
            }
            for (pos, value) in positions.into_iter().zip(raw) {
                predictions[pos] = (value + baseline[pos]).max(0.0);
            }
        }
        Ok(predictions)
    }

    /// `row_id, target` for submission.
    pub fn predictions_frame(&self, frame: &FeatureFrame) -> Result<DataFrame> {
        let predictions = self.predict(frame)?;
        Ok(DataFrame::new(vec![
            frame.row_id.clone().with_name(ROW_ID.into()),
            Series::new(TARGET.into(), predictions),
        ])?)
    }
}

fn consumption_flags(frame: &FeatureFrame) -> Result<Vec<bool>> {
    let flags = frame.features.column(IS_CONSUMPTION)?.bool()?;
    Ok(flags.into_iter().map(|f| f.unwrap_or(false)).collect())
}

fn lag_values(frame: &FeatureFrame, lag_hours: i64) -> Result<Vec<Option<f64>>> {
    let column = TargetFamily::Entity.lag_column(lag_hours);
    let series = frame.features.column(&column).map_err(|_| {
        FeatureError::InvalidConfig(format!("residual transform needs {column}"))
    })?;
    let series = series.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Target minus its lag (a missing lag counts as 0). Null where the target
/// itself is unknown.
pub fn residual_target(frame: &FeatureFrame, lag_hours: i64) -> Result<Vec<Option<f64>>> {
    training_target(frame, TargetTransform::Residual { lag_hours })
}

fn training_target(frame: &FeatureFrame, transform: TargetTransform) -> Result<Vec<Option<f64>>> {
    let target = frame
        .target
        .as_ref()
        .ok_or_else(|| FeatureError::InvalidConfig("training rows carry no target".into()))?;
    let target: Vec<Option<f64>> = target.cast(&DataType::Float64)?.f64()?.into_iter().collect();
    match transform {
        TargetTransform::Raw => Ok(target),
        TargetTransform::Residual { lag_hours } => {
            let lags = lag_values(frame, lag_hours)?;
            Ok(target
                .into_iter()
                .zip(lags)
                .map(|(t, lag)| t.map(|t| t - lag.unwrap_or(0.0)))
                .collect())
        }
    }
}
