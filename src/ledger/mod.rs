//! Daily ledger: one row per day of a month for a single product.

mod sheet;

pub use sheet::{LedgerSheet, RowStatus, AUTOSAVE_DELAY, SAVED_FLAG_DURATION};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::backend::{BackendError, DashboardStore};
use crate::calculators::{fmt_brl, ratio};
use crate::models::{DailyMetric, UserId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid month: {year}-{month:02}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("Day {day} is not in {year}-{month:02}")]
    InvalidDay { year: i32, month: u32, day: u32 },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Number of days in `month` (1-12) of `year`.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (first, last) = month_bounds(year, month)?;
    Some(last.day() - first.day() + 1)
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// Editable column of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerField {
    Investment,
    Revenue,
    Sales,
}

impl FromStr for LedgerField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "investment" => Ok(LedgerField::Investment),
            "revenue" => Ok(LedgerField::Revenue),
            "sales" => Ok(LedgerField::Sales),
            _ => Err(format!(
                "Unknown field '{}'. Valid options: investment, revenue, sales",
                s
            )),
        }
    }
}

/// Values typed into one row. `None` is an empty cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerEntry {
    pub investment: Option<f64>,
    pub revenue: Option<f64>,
    pub sales: Option<i64>,
}

impl LedgerEntry {
    fn from_metric(metric: &DailyMetric) -> Self {
        Self {
            investment: Some(metric.investment),
            revenue: Some(metric.revenue),
            sales: metric.sales,
        }
    }

    pub fn set(&mut self, field: LedgerField, value: Option<f64>) {
        match field {
            LedgerField::Investment => self.investment = value,
            LedgerField::Revenue => self.revenue = value,
            LedgerField::Sales => self.sales = value.map(|v| v.round() as i64),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.investment.is_none() && self.revenue.is_none() && self.sales.is_none()
    }

    pub fn result(&self) -> f64 {
        self.revenue.unwrap_or(0.0) - self.investment.unwrap_or(0.0)
    }

    pub fn roi(&self) -> f64 {
        ratio(self.revenue.unwrap_or(0.0), self.investment.unwrap_or(0.0))
    }

    pub fn cpa(&self) -> f64 {
        ratio(
            self.investment.unwrap_or(0.0),
            self.sales.unwrap_or(0) as f64,
        )
    }

    /// Row as stored: empty money cells become 0, zero sales become none.
    pub fn to_metric(&self, owner: &UserId, product_id: Uuid, date: NaiveDate) -> DailyMetric {
        let mut metric = DailyMetric::new(owner.clone(), product_id, date);
        metric.investment = self.investment.unwrap_or(0.0);
        metric.revenue = self.revenue.unwrap_or(0.0);
        metric.sales = self.sales.filter(|&s| s != 0);
        metric
    }
}

/// Month totals across every row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerTotals {
    pub investment: f64,
    pub revenue: f64,
    pub sales: i64,
}

impl LedgerTotals {
    pub fn result(&self) -> f64 {
        self.revenue - self.investment
    }

    pub fn roi(&self) -> f64 {
        ratio(self.revenue, self.investment)
    }

    pub fn cpa(&self) -> f64 {
        ratio(self.investment, self.sales as f64)
    }
}

/// One product's ledger for one month, keyed by day of month.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerMonth {
    pub product_id: Uuid,
    pub year: i32,
    pub month: u32,
    entries: BTreeMap<u32, LedgerEntry>,
}

impl LedgerMonth {
    pub fn empty(product_id: Uuid, year: i32, month: u32) -> Result<Self, LedgerError> {
        month_bounds(year, month).ok_or(LedgerError::InvalidMonth { year, month })?;
        Ok(Self {
            product_id,
            year,
            month,
            entries: BTreeMap::new(),
        })
    }

    /// Loads every stored row between the first and last day of the month.
    pub async fn load(
        store: &dyn DashboardStore,
        owner: &UserId,
        product_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Self, LedgerError> {
        let (from, to) =
            month_bounds(year, month).ok_or(LedgerError::InvalidMonth { year, month })?;
        let metrics = store
            .select_daily_metrics(owner, product_id, from, to)
            .await?;

        let entries = metrics
            .iter()
            .map(|m| (m.entry_date.day(), LedgerEntry::from_metric(m)))
            .collect();

        Ok(Self {
            product_id,
            year,
            month,
            entries,
        })
    }

    pub fn days(&self) -> u32 {
        days_in_month(self.year, self.month).unwrap_or(0)
    }

    pub fn date(&self, day: u32) -> Result<NaiveDate, LedgerError> {
        NaiveDate::from_ymd_opt(self.year, self.month, day).ok_or(LedgerError::InvalidDay {
            year: self.year,
            month: self.month,
            day,
        })
    }

    /// The row for `day`; days without a stored entry are empty.
    pub fn entry(&self, day: u32) -> LedgerEntry {
        self.entries.get(&day).copied().unwrap_or_default()
    }

    /// Edits one cell and returns the updated row.
    pub fn set(
        &mut self,
        day: u32,
        field: LedgerField,
        value: Option<f64>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.date(day)?;
        let entry = self.entries.entry(day).or_default();
        entry.set(field, value);
        Ok(*entry)
    }

    /// Every day of the month in order, including empty ones.
    pub fn rows(&self) -> impl Iterator<Item = (u32, LedgerEntry)> + '_ {
        (1..=self.days()).map(move |day| (day, self.entry(day)))
    }

    pub fn totals(&self) -> LedgerTotals {
        self.entries
            .values()
            .fold(LedgerTotals::default(), |mut totals, entry| {
                totals.investment += entry.investment.unwrap_or(0.0);
                totals.revenue += entry.revenue.unwrap_or(0.0);
                totals.sales += entry.sales.unwrap_or(0);
                totals
            })
    }
}

fn cell<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl fmt::Display for LedgerMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>3} {:>12} {:>12} {:>6} {:>14} {:>6} {:>12}",
            "Day", "Investment", "Revenue", "Sales", "Result", "ROI", "CPA"
        )?;
        for (day, entry) in self.rows() {
            writeln!(
                f,
                "{:>3} {:>12} {:>12} {:>6} {:>14} {:>6.2} {:>12}",
                format!("{:02}", day),
                cell(entry.investment.map(|v| format!("{:.2}", v))),
                cell(entry.revenue.map(|v| format!("{:.2}", v))),
                cell(entry.sales),
                fmt_brl(entry.result()),
                entry.roi(),
                fmt_brl(entry.cpa())
            )?;
        }
        let totals = self.totals();
        write!(
            f,
            "Total: invested {}, revenue {}, result {}, ROI {:.2}, CPA {}",
            fmt_brl(totals.investment),
            fmt_brl(totals.revenue),
            fmt_brl(totals.result()),
            totals.roi(),
            fmt_brl(totals.cpa())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, last) = month_bounds(2023, 12).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());

        assert!(month_bounds(2024, 13).is_none());
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2024, 4), Some(30));
    }

    #[test]
    fn test_row_indicators() {
        let entry = LedgerEntry {
            investment: Some(100.0),
            revenue: Some(250.0),
            sales: Some(4),
        };
        assert_eq!(entry.result(), 150.0);
        assert_eq!(entry.roi(), 2.5);
        assert_eq!(entry.cpa(), 25.0);

        let empty = LedgerEntry::default();
        assert_eq!(empty.result(), 0.0);
        assert_eq!(empty.roi(), 0.0);
        assert_eq!(empty.cpa(), 0.0);
    }

    #[test]
    fn test_to_metric_fills_missing_values() {
        let owner = UserId::new("u1");
        let product = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let entry = LedgerEntry {
            investment: None,
            revenue: Some(80.0),
            sales: Some(0),
        };

        let metric = entry.to_metric(&owner, product, date);
        assert_eq!(metric.investment, 0.0);
        assert_eq!(metric.revenue, 80.0);
        assert_eq!(metric.sales, None);
        assert_eq!(metric.entry_date, date);
    }

    #[test]
    fn test_set_rejects_days_outside_month() {
        let mut month = LedgerMonth::empty(Uuid::new_v4(), 2023, 2).unwrap();
        assert!(matches!(
            month.set(29, LedgerField::Revenue, Some(1.0)),
            Err(LedgerError::InvalidDay { day: 29, .. })
        ));
        let entry = month.set(28, LedgerField::Sales, Some(2.6)).unwrap();
        assert_eq!(entry.sales, Some(3));
        assert_eq!(month.rows().count(), 28);
    }

    #[tokio::test]
    async fn test_load_maps_entries_by_day() {
        let backend = MemoryBackend::new();
        let owner = UserId::new("u1");
        let product = Uuid::new_v4();

        for (date, investment) in [((2024, 3, 31), 10.0), ((2024, 4, 2), 20.0), ((2024, 4, 30), 30.0)] {
            let mut metric = DailyMetric::new(
                owner.clone(),
                product,
                NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            );
            metric.investment = investment;
            backend.upsert_daily_metric(&metric).await.unwrap();
        }

        let month = LedgerMonth::load(&backend, &owner, product, 2024, 4)
            .await
            .unwrap();
        assert_eq!(month.entry(2).investment, Some(20.0));
        assert_eq!(month.entry(30).investment, Some(30.0));
        assert!(month.entry(1).is_empty());
        assert_eq!(month.totals().investment, 50.0);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_month() {
        let backend = MemoryBackend::new();
        let result = LedgerMonth::load(&backend, &UserId::new("u1"), Uuid::new_v4(), 2024, 0).await;
        assert!(matches!(result, Err(LedgerError::InvalidMonth { .. })));
    }
}
