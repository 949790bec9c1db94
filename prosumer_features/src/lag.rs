//! Point-in-time joins. Source rows are only ever moved later in time, so a
//! feature at `t` can only see observations from `t - h`.

use crate::models::datetime_dtype;
use chrono::NaiveDateTime;
use polars::prelude::*;

pub const MICROS_PER_HOUR: i64 = 3_600_000_000;

pub fn datetime_lit(ts: NaiveDateTime) -> Expr {
    lit(ts.and_utc().timestamp_micros()).cast(datetime_dtype())
}

/// `expr + hours`, for a naive microsecond datetime expression.
pub fn shift_hours(expr: Expr, hours: i64) -> Expr {
    (expr.cast(DataType::Int64) + lit(hours * MICROS_PER_HOUR)).cast(datetime_dtype())
}

/// `expr + days`, for a date expression.
pub fn shift_days(expr: Expr, days: i64) -> Expr {
    (expr.cast(DataType::Int32) + lit(days as i32)).cast(DataType::Date)
}

/// One lag-join: which columns to take from a keyed source, how far to move
/// them, and what they are called once joined.
#[derive(Debug, Clone)]
pub struct LagJoin<'a> {
    pub keys: &'a [String],
    pub time_column: &'a str,
    pub hours: i64,
    /// (source column, output column)
    pub columns: Vec<(String, String)>,
}

impl<'a> LagJoin<'a> {
    /// Output columns are the source names followed by `suffix`.
    pub fn suffixed(
        keys: &'a [String],
        time_column: &'a str,
        hours: i64,
        values: &[String],
        suffix: &str,
    ) -> Self {
        Self {
            keys,
            time_column,
            hours,
            columns: values
                .iter()
                .map(|v| (v.clone(), format!("{v}{suffix}")))
                .collect(),
        }
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.columns.iter().map(|(_, out)| out.clone()).collect()
    }

    /// The source with its timestamps advanced by `hours` and its value
    /// columns renamed. The time column is renamed to `target_time`.
    pub fn shifted(&self, source: LazyFrame, target_time: &str) -> LazyFrame {
        let mut exprs: Vec<Expr> = self.keys.iter().map(|k| col(k.as_str())).collect();
        exprs.push(shift_hours(col(self.time_column), self.hours).alias(target_time));
        exprs.extend(
            self.columns
                .iter()
                .map(|(src, out)| col(src.as_str()).alias(out.as_str())),
        );
        source.select(exprs)
    }

    /// Left-joins the shifted source onto `features` on (keys, `target_time`).
    /// Unmatched rows get nulls.
    pub fn apply(&self, features: LazyFrame, source: LazyFrame, target_time: &str) -> LazyFrame {
        let mut on: Vec<Expr> = self.keys.iter().map(|k| col(k.as_str())).collect();
        on.push(col(target_time));
        features.join(
            self.shifted(source, target_time),
            on.clone(),
            on,
            JoinArgs::new(JoinType::Left),
        )
    }
}
