use crate::types::{MonthValues, YearSeries};

/// Move every one-month change figure one month later.
///
/// The value published under month *i − 1* is stored under month *i*; January
/// becomes absent and December's published value is dropped. Values are only
/// relocated, never recomputed. The aggregate is not part of the shift.
pub fn shift_one_month(values: &MonthValues) -> MonthValues {
    let mut months = [None; 12];
    months[1..].copy_from_slice(&values.months[..11]);
    MonthValues {
        aggregate: values.aggregate,
        months,
    }
}

pub fn derive_one_month_change(series: &YearSeries) -> YearSeries {
    series
        .iter()
        .map(|(year, values)| (*year, shift_one_month(values)))
        .collect()
}
