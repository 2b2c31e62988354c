//! Forecast explorer
//!
//! Turns a trained model into a dated series of predictions, aggregated by
//! day, week or month, with actuals attached wherever the dataset has them.

use crate::attribution::FeatureImpact;
use crate::config::AttributionConfig;
use crate::data::{Dataset, Record};
use crate::error::{PipelineError, Result};
use crate::features::FeatureContext;
use crate::metrics::{evaluate, Metrics};
use crate::models::TrainedModel;
use crate::utils::{date_span, month_start, week_start};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Longest range a forecast may cover, in days
pub const MAX_RANGE_DAYS: i64 = 3660;

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(PipelineError::InvalidParameter(format!(
                "Range start {} is after end {}",
                start, end
            )));
        }
        if (end - start).num_days() >= MAX_RANGE_DAYS {
            return Err(PipelineError::InvalidParameter(format!(
                "Range may cover at most {} days",
                MAX_RANGE_DAYS
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covering every date in the dataset, `None` if it is empty
    pub fn of(dataset: &Dataset) -> Option<Self> {
        let dates = dataset.dates();
        Some(Self {
            start: *dates.first()?,
            end: *dates.last()?,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        date_span(self.start, self.end)
    }
}

/// Aggregation bucket for forecast points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Day,
    /// Weeks starting on Monday
    Week,
    /// Calendar months
    Month,
}

impl Granularity {
    /// First date of the bucket holding `date`
    pub fn bucket(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => week_start(date),
            Granularity::Month => month_start(date),
        }
    }
}

/// What to forecast
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastQuery {
    pub range: DateRange,
    pub granularity: Granularity,
    /// Restrict to one item; all trained items otherwise
    pub item: Option<String>,
}

impl ForecastQuery {
    pub fn daily(range: DateRange) -> Self {
        Self {
            range,
            granularity: Granularity::Day,
            item: None,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn for_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }
}

/// One bucket of the forecast series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    /// First date of the bucket, clipped to the range
    pub date: NaiveDate,
    pub predicted: f64,
    /// Total sold, if any record falls in the bucket
    pub actual: Option<f64>,
}

/// Forecast series with the model's evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub points: Vec<ForecastPoint>,
    pub metrics: Metrics,
    pub impacts: Vec<FeatureImpact>,
}

/// Forecast `query` with `model`, attaching actuals from `dataset`
pub fn build_forecast(
    model: &TrainedModel,
    dataset: &Dataset,
    query: &ForecastQuery,
    attribution: &AttributionConfig,
) -> Result<ForecastResult> {
    let items: Vec<String> = match &query.item {
        Some(item) => {
            let known = model.model().items().contains(item) || dataset.items().contains(item);
            if !known {
                return Err(PipelineError::NotFound { id: item.clone() });
            }
            vec![item.clone()]
        }
        None => model.model().items().to_vec(),
    };

    let mut observed: BTreeMap<(&str, NaiveDate), Vec<&Record>> = BTreeMap::new();
    for record in dataset.between(query.range.start, query.range.end) {
        if items.contains(&record.item) {
            observed
                .entry((record.item.as_str(), record.date))
                .or_default()
                .push(record);
        }
    }

    let mut buckets: BTreeMap<NaiveDate, (f64, Option<f64>)> = BTreeMap::new();
    for date in query.range.days() {
        let key = query.granularity.bucket(date).max(query.range.start);
        let bucket = buckets.entry(key).or_insert((0.0, None));
        for item in &items {
            match observed.get(&(item.as_str(), date)) {
                Some(records) => {
                    // Known conditions on the day drive the prediction, one
                    // per record so it lines up with the summed actuals
                    bucket.0 += records
                        .iter()
                        .map(|record| model.predict(&FeatureContext::from(*record)))
                        .sum::<f64>();
                    let sold: f64 = records.iter().map(|r| r.quantity_sold).sum();
                    bucket.1 = Some(bucket.1.unwrap_or(0.0) + sold);
                }
                None => {
                    bucket.0 += model.predict(&FeatureContext::future(item, date));
                }
            }
        }
    }

    let points = buckets
        .into_iter()
        .map(|(date, (predicted, actual))| ForecastPoint {
            date,
            predicted,
            actual,
        })
        .collect();

    let evaluation = evaluate(model, model.evaluation_set(), attribution)?;
    tracing::info!(
        start = %query.range.start,
        end = %query.range.end,
        granularity = ?query.granularity,
        items = items.len(),
        "Forecast built"
    );

    Ok(ForecastResult {
        points,
        metrics: evaluation.metrics,
        impacts: evaluation.impacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_range_validation() {
        assert!(DateRange::new(date("2024-03-10"), date("2024-03-01")).is_err());
        let range = DateRange::new(date("2024-03-01"), date("2024-03-01")).unwrap();
        assert_eq!(range.days().len(), 1);
        assert!(range.contains(date("2024-03-01")));
        assert!(DateRange::new(date("2000-01-01"), date("2024-01-01")).is_err());
    }

    #[rstest]
    #[case(Granularity::Day, "2024-03-13", "2024-03-13")]
    #[case(Granularity::Week, "2024-03-13", "2024-03-11")]
    #[case(Granularity::Week, "2024-03-11", "2024-03-11")]
    #[case(Granularity::Month, "2024-03-13", "2024-03-01")]
    fn test_buckets(#[case] granularity: Granularity, #[case] day: &str, #[case] expected: &str) {
        assert_eq!(granularity.bucket(date(day)), date(expected));
    }

    #[test]
    fn test_range_ending_at_last_date() {
        let last = NaiveDate::MAX;
        let range = DateRange::new(last.pred_opt().unwrap(), last).unwrap();
        assert_eq!(range.days(), vec![last.pred_opt().unwrap(), last]);
        assert!(Granularity::Week.bucket(last) <= last);
    }

    #[test]
    fn test_duplicate_rows_predict_per_record() {
        use crate::features::FeatureRegistry;
        use crate::models::{AdditiveDemandModel, DemandModel};
        use crate::training::JobId;

        let mut records: Vec<Record> = (1..=7)
            .map(|day| Record::new("Soup", date(&format!("2024-03-0{}", day)), 50.0, 20.0))
            .collect();
        records.push(Record::new("Soup", date("2024-03-03"), 50.0, 20.0));

        let mut registry = FeatureRegistry::default();
        registry.toggle("weekday").unwrap();
        registry.toggle("weather").unwrap();
        let features = registry.snapshot();
        let mut fit = AdditiveDemandModel::new(4, 0.0)
            .unwrap()
            .begin_fit(&records, &features)
            .unwrap();
        for _ in 0..fit.total_steps() {
            fit.step().unwrap();
        }
        let dataset = Dataset::new(records.clone());
        let model = TrainedModel::new(
            JobId(1),
            fit.finish().unwrap(),
            features,
            dataset.clone(),
            Dataset::default(),
        );

        let range = DateRange::new(date("2024-03-02"), date("2024-03-03")).unwrap();
        let result = build_forecast(
            &model,
            &dataset,
            &ForecastQuery::daily(range),
            &AttributionConfig::default(),
        )
        .unwrap();

        let single = &result.points[0];
        let doubled = &result.points[1];
        assert_eq!(doubled.actual, Some(40.0));
        assert!((doubled.predicted - 2.0 * single.predicted).abs() < 1e-9);
    }

    #[test]
    fn test_range_of_dataset() {
        let dataset = Dataset::new(vec![
            Record::new("Soup", date("2024-03-05"), 10.0, 5.0),
            Record::new("Soup", date("2024-03-01"), 10.0, 5.0),
        ]);
        let range = DateRange::of(&dataset).unwrap();
        assert_eq!(range.start(), date("2024-03-01"));
        assert_eq!(range.end(), date("2024-03-05"));
        assert!(DateRange::of(&Dataset::default()).is_none());
    }
}
