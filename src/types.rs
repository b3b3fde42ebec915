use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A published inflation metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Indicator {
    #[serde(rename = "CPI")]
    Cpi,
    #[serde(rename = "CPIH")]
    Cpih,
    #[serde(rename = "RPI")]
    Rpi,
}

impl Indicator {
    /// Processing order of a full ingestion run.
    pub const ALL: [Indicator; 3] = [Indicator::Cpi, Indicator::Cpih, Indicator::Rpi];

    pub fn name(&self) -> &'static str {
        match self {
            Indicator::Cpi => "CPI",
            Indicator::Cpih => "CPIH",
            Indicator::Rpi => "RPI",
        }
    }

    /// Storage target for one variant of this indicator.
    pub fn table(&self, variant: Variant) -> TableSpec {
        let name = match (self, variant) {
            (Indicator::Cpi, Variant::Observation) => "cpi_observations",
            (Indicator::Cpi, Variant::TwelveMonthPercentageChange) => {
                "cpi_twelve_month_percent_change"
            }
            (Indicator::Cpi, Variant::OneMonthPercentageChange) => "cpi_one_month_percent_change",
            (Indicator::Cpih, Variant::Observation) => "cpih_observations",
            (Indicator::Cpih, Variant::TwelveMonthPercentageChange) => {
                "cpih_twelve_month_percent_change"
            }
            (Indicator::Cpih, Variant::OneMonthPercentageChange) => {
                "cpih_one_month_percent_change"
            }
            (Indicator::Rpi, Variant::Observation) => "rpi_observations",
            (Indicator::Rpi, Variant::TwelveMonthPercentageChange) => {
                "rpi_twelve_month_percent_change"
            }
            (Indicator::Rpi, Variant::OneMonthPercentageChange) => "rpi_one_month_percent_change",
        };
        TableSpec {
            name,
            aggregate: variant.aggregate_column(),
        }
    }

    /// Every table the store manages, in ingestion order.
    pub fn all_tables() -> impl Iterator<Item = TableSpec> {
        Indicator::ALL
            .into_iter()
            .flat_map(|indicator| Variant::ALL.into_iter().map(move |v| indicator.table(v)))
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Indicator {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CPI" => Ok(Indicator::Cpi),
            "CPIH" => Ok(Indicator::Cpih),
            "RPI" => Ok(Indicator::Rpi),
            _ => Err(IngestError::UnknownSeries {
                indicator: s.to_string(),
                variant: String::new(),
            }),
        }
    }
}

/// One of the three series published for every indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    Observation,
    TwelveMonthPercentageChange,
    OneMonthPercentageChange,
}

impl Variant {
    /// Variants in the order their sections are stacked on a worksheet.
    pub const ALL: [Variant; 3] = [
        Variant::Observation,
        Variant::TwelveMonthPercentageChange,
        Variant::OneMonthPercentageChange,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Observation => "Observation",
            Variant::TwelveMonthPercentageChange => "TwelveMonthPercentageChange",
            Variant::OneMonthPercentageChange => "OneMonthPercentageChange",
        }
    }

    pub fn aggregate_column(&self) -> Option<AggregateColumn> {
        match self {
            Variant::Observation => Some(AggregateColumn::AnnualAverage),
            Variant::TwelveMonthPercentageChange => Some(AggregateColumn::AnnualChange),
            Variant::OneMonthPercentageChange => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Variant {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Variant::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| IngestError::UnknownSeries {
                indicator: String::new(),
                variant: s.to_string(),
            })
    }
}

/// Resolve a read request's names, reporting both halves on failure.
pub fn parse_series(indicator: &str, variant: &str) -> Result<(Indicator, Variant)> {
    match (indicator.parse::<Indicator>(), variant.parse::<Variant>()) {
        (Ok(i), Ok(v)) => Ok((i, v)),
        _ => Err(IngestError::UnknownSeries {
            indicator: indicator.to_string(),
            variant: variant.to_string(),
        }),
    }
}

/// Calendar months in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// Canonical storage key, also the column name.
    pub fn key(&self) -> &'static str {
        match self {
            Month::Jan => "jan",
            Month::Feb => "feb",
            Month::Mar => "mar",
            Month::Apr => "apr",
            Month::May => "may",
            Month::Jun => "jun",
            Month::Jul => "jul",
            Month::Aug => "aug",
            Month::Sep => "sep",
            Month::Oct => "oct",
            Month::Nov => "nov",
            Month::Dec => "dec",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Canonical key a worksheet column is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    Month(Month),
    Aggregate,
}

/// Name of the per-year summary column a table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateColumn {
    AnnualAverage,
    AnnualChange,
}

impl AggregateColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            AggregateColumn::AnnualAverage => "annual_average",
            AggregateColumn::AnnualChange => "annual_change",
        }
    }
}

/// A persisted (Indicator, Variant) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub aggregate: Option<AggregateColumn>,
}

impl TableSpec {
    /// `year`, the optional aggregate, then the twelve months.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(14);
        columns.push("year");
        if let Some(aggregate) = self.aggregate {
            columns.push(aggregate.column_name());
        }
        columns.extend(Month::ALL.iter().map(|m| m.key()));
        columns
    }
}

/// Cleaned values of one worksheet row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthValues {
    pub aggregate: Option<f64>,
    pub months: [Option<f64>; 12],
}

impl MonthValues {
    pub fn get(&self, month: Month) -> Option<f64> {
        self.months[month.index()]
    }

    pub fn set(&mut self, key: ColumnKey, value: Option<f64>) {
        match key {
            ColumnKey::Month(month) => self.months[month.index()] = value,
            ColumnKey::Aggregate => self.aggregate = value,
        }
    }
}

/// The unit of storage: one year of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesRecord {
    pub year: i32,
    pub values: MonthValues,
}

/// Year-keyed values of one series; later rows for a repeated year replace
/// earlier ones.
pub type YearSeries = BTreeMap<i32, MonthValues>;

/// Records of a series in ascending year order.
pub fn records(series: &YearSeries) -> impl Iterator<Item = TimeSeriesRecord> + '_ {
    series.iter().map(|(year, values)| TimeSeriesRecord {
        year: *year,
        values: *values,
    })
}
