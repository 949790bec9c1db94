use crate::models::{TableSpec, COUNTY, DATETIME, LATITUDE, LONGITUDE};
use log::debug;
use polars::prelude::*;

/// Station weather reduced to one row per timestamp (`global`) and one row
/// per (county, timestamp) (`regional`).
pub struct WeatherAggregates {
    pub global: LazyFrame,
    pub regional: LazyFrame,
    /// Averaged columns, in catalogue order.
    pub columns: Vec<String>,
}

pub struct WeatherAggregator {
    stations: LazyFrame,
}

impl WeatherAggregator {
    pub fn new(station_map: &DataFrame) -> Self {
        Self {
            stations: station_map.clone().lazy().select([
                col(LATITUDE).cast(DataType::Float32),
                col(LONGITUDE).cast(DataType::Float32),
                col(COUNTY),
            ]),
        }
    }

    /// Forecasts issued for the coming day: `hours_ahead` inside the inclusive
    /// window, keyed by the time they forecast.
    pub fn forecast(
        &self,
        forecast_weather: &DataFrame,
        spec: &TableSpec,
        hours_ahead: [i64; 2],
    ) -> WeatherAggregates {
        let [lo, hi] = hours_ahead;
        let values = spec.value_columns();
        let mut exprs = vec![
            col("forecast_datetime").alias(DATETIME),
            col(LATITUDE),
            col(LONGITUDE),
        ];
        exprs.extend(values.iter().map(|v| col(v.as_str())));
        let windowed = forecast_weather
            .clone()
            .lazy()
            .filter(
                col("hours_ahead")
                    .gt_eq(lit(lo))
                    .and(col("hours_ahead").lt_eq(lit(hi))),
            )
            .select(exprs);
        debug!("forecast weather window [{lo}, {hi}] over {} rows", forecast_weather.height());
        self.aggregate(windowed, values)
    }

    pub fn historical(&self, historical_weather: &DataFrame, spec: &TableSpec) -> WeatherAggregates {
        let values = spec.value_columns();
        self.aggregate(historical_weather.clone().lazy(), values)
    }

    fn aggregate(&self, observations: LazyFrame, values: Vec<String>) -> WeatherAggregates {
        let located = observations
            .with_columns([
                col(LATITUDE).cast(DataType::Float32),
                col(LONGITUDE).cast(DataType::Float32),
            ])
            .join(
                self.stations.clone(),
                [col(LATITUDE), col(LONGITUDE)],
                [col(LATITUDE), col(LONGITUDE)],
                JoinArgs::new(JoinType::Left),
            );

        let means: Vec<Expr> = values
            .iter()
            .map(|v| col(v.as_str()).cast(DataType::Float64).mean())
            .collect();

        let global = located
            .clone()
            .group_by_stable([col(DATETIME)])
            .agg(means.clone());
        let regional = located
            .filter(col(COUNTY).is_not_null())
            .group_by_stable([col(COUNTY), col(DATETIME)])
            .agg(means);

        WeatherAggregates {
            global,
            regional,
            columns: values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableCatalog;
    use crate::test_support::*;

    #[test]
    fn test_forecast_window_excludes_far_horizons() {
        let catalog = TableCatalog::default();
        let stations = station_frame(&[(24.0, 59.0, Some(7))]);
        let forecast = forecast_frame(&[
            ("2023-01-10 05:00", 59.0, 24.0, 24, 1.0),
            ("2023-01-10 05:00", 59.0, 24.0, 50, 100.0),
            ("2023-01-10 06:00", 59.0, 24.0, 50, 100.0),
        ]);

        let aggregates = WeatherAggregator::new(&stations).forecast(
            &forecast,
            &catalog.forecast_weather,
            [22, 45],
        );
        let global = aggregates.global.collect().unwrap();

        assert_eq!(global.height(), 1);
        assert_eq!(
            global.column("temperature").unwrap().f64().unwrap().get(0),
            Some(1.0)
        );
        assert!(global.column("hours_ahead").is_err());
    }

    #[test]
    fn test_forecast_window_bounds_are_inclusive() {
        let catalog = TableCatalog::default();
        let stations = station_frame(&[(24.0, 59.0, Some(7))]);
        let forecast = forecast_frame(&[
            ("2023-01-10 05:00", 59.0, 24.0, 22, 1.0),
            ("2023-01-10 05:00", 59.0, 24.0, 45, 3.0),
            ("2023-01-10 05:00", 59.0, 24.0, 21, 100.0),
            ("2023-01-10 05:00", 59.0, 24.0, 46, -100.0),
        ]);

        let aggregates = WeatherAggregator::new(&stations).forecast(
            &forecast,
            &catalog.forecast_weather,
            [22, 45],
        );
        let global = aggregates.global.collect().unwrap();
        let regional = aggregates.regional.collect().unwrap();

        assert_eq!(
            global.column("temperature").unwrap().f64().unwrap().get(0),
            Some(2.0)
        );
        assert_eq!(
            regional.column("temperature").unwrap().f64().unwrap().get(0),
            Some(2.0)
        );
    }

    #[test]
    fn test_station_observation_lands_in_its_county() {
        let catalog = TableCatalog::default();
        let stations = station_frame(&[(24.0, 59.0, Some(7)), (25.0, 58.0, None)]);
        let historical = historical_frame(&[
            ("2023-01-10 05:00", 59.0, 24.0, 4.0),
            ("2023-01-10 05:00", 58.0, 25.0, 8.0),
            ("2023-01-10 05:00", 57.5, 26.5, 12.0),
        ]);

        let aggregates = WeatherAggregator::new(&stations)
            .historical(&historical, &catalog.historical_weather);
        let regional = aggregates.regional.collect().unwrap();
        let global = aggregates.global.collect().unwrap();

        assert_eq!(regional.height(), 1);
        assert_eq!(regional.column(COUNTY).unwrap().i64().unwrap().get(0), Some(7));
        assert_eq!(
            regional.column("temperature").unwrap().f64().unwrap().get(0),
            Some(4.0)
        );
        // Unmapped stations still count towards the national mean.
        assert_eq!(
            global.column("temperature").unwrap().f64().unwrap().get(0),
            Some(8.0)
        );
        assert!(global.column(COUNTY).is_err());
    }

    #[test]
    fn test_coordinates_match_across_float_widths() {
        let catalog = TableCatalog::default();
        let stations = station_frame(&[(24.2, 59.1, Some(3))]);
        let historical = DataFrame::new(vec![
            datetimes(DATETIME, &["2023-01-10 05:00"]),
            Series::new("temperature".into(), vec![2.5]),
            Series::new(LATITUDE.into(), vec![59.1f64]),
            Series::new(LONGITUDE.into(), vec![24.2f64]),
        ])
        .unwrap();
        let historical = catalog
            .historical_weather
            .null_padded(1, historical.get_columns().to_vec())
            .unwrap();

        let regional = WeatherAggregator::new(&stations)
            .historical(&historical, &catalog.historical_weather)
            .regional
            .collect()
            .unwrap();
        assert_eq!(regional.height(), 1);
    }
}
