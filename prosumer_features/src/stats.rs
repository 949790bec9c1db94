//! Row-wise statistics over lag columns. Nulls are missing lags, never zeros.

use polars::prelude::*;

fn present(c: &str) -> Expr {
    col(c).is_not_null().cast(DataType::Float64)
}

fn sum_exprs(exprs: impl Iterator<Item = Expr>) -> Expr {
    exprs.reduce(|acc, e| acc + e).unwrap_or_else(|| lit(0.0))
}

fn null_f64() -> Expr {
    lit(NULL).cast(DataType::Float64)
}

/// Number of non-null values across `columns`.
pub fn row_count(columns: &[String]) -> Expr {
    sum_exprs(columns.iter().map(|c| present(c)))
}

/// Mean of the non-null values; null when every value is null.
pub fn row_mean(columns: &[String]) -> Expr {
    let total = sum_exprs(
        columns
            .iter()
            .map(|c| col(c.as_str()).cast(DataType::Float64).fill_null(lit(0.0))),
    );
    let count = row_count(columns);
    when(count.clone().gt(lit(0.0)))
        .then(total / count)
        .otherwise(null_f64())
}

/// Sample standard deviation (ddof = 1) of the non-null values; null with
/// fewer than two values.
pub fn row_std(columns: &[String]) -> Expr {
    let mean = row_mean(columns);
    let squares = sum_exprs(columns.iter().map(|c| {
        let deviation = col(c.as_str()).cast(DataType::Float64) - mean.clone();
        when(col(c.as_str()).is_not_null())
            .then(deviation.clone() * deviation)
            .otherwise(lit(0.0))
    }));
    let count = row_count(columns);
    let variance = squares / (count.clone() - lit(1.0));
    when(count.gt_eq(lit(2.0)))
        .then(sqrt(variance))
        .otherwise(null_f64())
}

fn sqrt(expr: Expr) -> Expr {
    expr.map(
        |s| {
            let ca = s.f64()?;
            Ok(Some(ca.apply_values(f64::sqrt).into_series()))
        },
        GetOutput::from_type(DataType::Float64),
    )
}

/// `short / (long + epsilon)`. Null when either side is missing or the
/// shifted denominator is exactly zero.
pub fn safe_ratio(short: &str, long: &str, epsilon: f64) -> Expr {
    let denominator = col(long).cast(DataType::Float64) + lit(epsilon);
    when(
        col(short)
            .is_null()
            .or(col(long).is_null())
            .or(denominator.clone().eq(lit(0.0))),
    )
    .then(null_f64())
    .otherwise(col(short).cast(DataType::Float64) / denominator)
}

/// Natural log, with 0 and null mapped to 0.
pub fn log_or_zero(column: &str) -> Expr {
    let value = col(column).cast(DataType::Float64);
    when(value.clone().is_null().or(value.clone().eq(lit(0.0))))
        .then(lit(0.0))
        .otherwise(value.log(std::f64::consts::E))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lags() -> DataFrame {
        DataFrame::new(vec![
            Series::new("a".into(), vec![Some(1.0), None, None, Some(0.0)]),
            Series::new("b".into(), vec![Some(2.0), Some(4.0), None, Some(0.0)]),
            Series::new("c".into(), vec![Some(3.0), None, None, Some(-0.001)]),
            Series::new("d".into(), vec![Some(6.0), None, None, Some(5.0)]),
        ])
        .unwrap()
    }

    fn names() -> Vec<String> {
        ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_row_mean_skips_nulls() {
        let out = lags()
            .lazy()
            .select([row_mean(&names()).alias("mean")])
            .collect()
            .unwrap();
        let mean = out.column("mean").unwrap().f64().unwrap();
        assert_eq!(mean.get(0), Some(3.0));
        assert_eq!(mean.get(1), Some(4.0));
        assert_eq!(mean.get(2), None);
    }

    #[test]
    fn test_row_std_is_sample_deviation() {
        let out = lags()
            .lazy()
            .select([row_std(&names()).alias("std")])
            .collect()
            .unwrap();
        let std = out.column("std").unwrap().f64().unwrap();
        // 1, 2, 3, 6: mean 3, squared deviations 4 + 1 + 0 + 9 = 14, / 3
        assert!((std.get(0).unwrap() - (14.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(std.get(1), None);
        assert_eq!(std.get(2), None);
    }

    #[test]
    fn test_ratio_is_finite_or_null() {
        let out = lags()
            .lazy()
            .select([
                safe_ratio("a", "b", 1e-3).alias("a_b"),
                safe_ratio("d", "c", 1e-3).alias("d_c"),
                safe_ratio("b", "a", 1e-3).alias("b_a"),
            ])
            .collect()
            .unwrap();

        let a_b = out.column("a_b").unwrap().f64().unwrap();
        assert!((a_b.get(0).unwrap() - 1.0 / 2.001).abs() < 1e-12);
        assert_eq!(a_b.get(1), None);
        assert_eq!(a_b.get(2), None);
        assert_eq!(a_b.get(3), Some(0.0));

        // c + epsilon == 0 on the last row.
        let d_c = out.column("d_c").unwrap().f64().unwrap();
        assert_eq!(d_c.get(3), None);

        for column in ["a_b", "d_c", "b_a"] {
            for value in out.column(column).unwrap().f64().unwrap().into_iter().flatten() {
                assert!(value.is_finite(), "{column} produced {value}");
            }
        }
    }

    #[test]
    fn test_log_maps_zero_and_null_to_zero() {
        let df = DataFrame::new(vec![Series::new(
            "x".into(),
            vec![Some(0.0), None, Some(std::f64::consts::E)],
        )])
        .unwrap();
        let out = df
            .lazy()
            .select([log_or_zero("x").alias("log_x")])
            .collect()
            .unwrap();
        let log_x = out.column("log_x").unwrap().f64().unwrap();
        assert_eq!(log_x.get(0), Some(0.0));
        assert_eq!(log_x.get(1), Some(0.0));
        assert!((log_x.get(2).unwrap() - 1.0).abs() < 1e-12);
    }
}
