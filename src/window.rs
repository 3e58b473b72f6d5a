//! Calendar windows relative to an injected reference timestamp.
//!
//! Nothing here reads the wall clock; the caller supplies `now` so a run is
//! reproducible.

use crate::aggregate::Fact;
use crate::util::{first_of_month, month_label, months_before};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Activity {
    /// At least one record contributed.
    Observed,
    /// The window or group matched zero records. Not an error.
    NoActivity,
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub name: &'static str,
    pub label: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        let at = date.and_time(NaiveTime::MIN);
        self.start <= at && at < self.end
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    /// One window covering `windows` from the first start to the last end.
    pub fn span(name: &'static str, windows: &[TimeWindow]) -> Option<TimeWindow> {
        let first = windows.first()?;
        let last = windows.last()?;
        Some(TimeWindow {
            name,
            label: format!("{}..{}", first.label, last.label),
            start: first.start,
            end: last.end,
        })
    }

    pub fn filter<'a, T: Fact>(&self, records: &'a [T]) -> WindowSlice<'a, T> {
        let matched: Vec<&'a T> = records.iter().filter(|r| self.contains(r.date())).collect();
        if matched.is_empty() {
            warn!(window = self.name, label = %self.label, "window matched no records");
        } else {
            debug!(window = self.name, label = %self.label, rows = matched.len(), "window filtered");
        }
        WindowSlice { window: self.clone(), records: matched }
    }
}

/// Records of one window, borrowed in input order.
#[derive(Debug, Clone)]
pub struct WindowSlice<'a, T> {
    pub window: TimeWindow,
    pub records: Vec<&'a T>,
}

impl<'a, T> WindowSlice<'a, T> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn activity(&self) -> Activity {
        if self.records.is_empty() {
            Activity::NoActivity
        } else {
            Activity::Observed
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        self.records.iter().copied()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSelector {
    now: NaiveDateTime,
}

impl WindowSelector {
    pub fn new(now: NaiveDateTime) -> Self {
        WindowSelector { now }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn current_month(&self) -> TimeWindow {
        let start = first_of_month(self.now.date());
        TimeWindow {
            name: "current_month",
            label: month_label(start),
            start: start.and_time(NaiveTime::MIN),
            end: self.now,
        }
    }

    pub fn previous_month(&self) -> TimeWindow {
        self.whole_month("previous_month", 1)
    }

    /// Whole calendar months before the current one, oldest first.
    pub fn trailing_months(&self, n: u32) -> Vec<TimeWindow> {
        (1..=n).rev().map(|k| self.whole_month("trailing_month", k)).collect()
    }

    pub fn current_week(&self) -> TimeWindow {
        let monday = self.monday();
        TimeWindow {
            name: "current_week",
            label: week_label(monday),
            start: monday.and_time(NaiveTime::MIN),
            end: self.now,
        }
    }

    pub fn previous_week(&self) -> TimeWindow {
        let monday = self.monday();
        let start = monday - Duration::days(7);
        TimeWindow {
            name: "previous_week",
            label: week_label(start),
            start: start.and_time(NaiveTime::MIN),
            end: monday.and_time(NaiveTime::MIN),
        }
    }

    fn monday(&self) -> NaiveDate {
        let today = self.now.date();
        today - Duration::days(today.weekday().num_days_from_monday() as i64)
    }

    fn whole_month(&self, name: &'static str, back: u32) -> TimeWindow {
        let start = months_before(self.now.date(), back);
        let end = months_before(self.now.date(), back - 1);
        TimeWindow {
            name,
            label: month_label(start),
            start: start.and_time(NaiveTime::MIN),
            end: end.and_time(NaiveTime::MIN),
        }
    }
}

fn week_label(monday: NaiveDate) -> String {
    monday.format("%G-W%V").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRecord;
    use rust_decimal::Decimal;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn order(id: &str, d: NaiveDate) -> OrderRecord {
        OrderRecord {
            order_id: id.to_string(),
            customer_id: "c".to_string(),
            order_date: d,
            amount: Decimal::ONE,
            returned: false,
            satisfaction: 4,
        }
    }

    #[test]
    fn month_windows() {
        // Wednesday 2024-03-13, noon
        let sel = WindowSelector::new(at(2024, 3, 13, 12));
        let cur = sel.current_month();
        assert_eq!(cur.label, "2024-03");
        assert!(cur.contains(date(2024, 3, 1)));
        assert!(cur.contains(date(2024, 3, 13)));
        assert!(!cur.contains(date(2024, 3, 14)));
        assert!(!cur.contains(date(2024, 2, 29)));

        let prev = sel.previous_month();
        assert_eq!(prev.label, "2024-02");
        assert!(prev.contains(date(2024, 2, 1)));
        assert!(prev.contains(date(2024, 2, 29)));
        assert!(!prev.contains(date(2024, 3, 1)));
    }

    #[test]
    fn previous_month_crosses_year() {
        let sel = WindowSelector::new(at(2024, 1, 10, 0));
        assert_eq!(sel.previous_month().label, "2023-12");
        let trailing: Vec<String> = sel.trailing_months(3).into_iter().map(|w| w.label).collect();
        assert_eq!(trailing, vec!["2023-10", "2023-11", "2023-12"]);
        let span = TimeWindow::span("trailing", &sel.trailing_months(3)).unwrap();
        assert!(span.contains(date(2023, 10, 1)));
        assert!(!span.contains(date(2024, 1, 1)));
        assert!(TimeWindow::span("none", &[]).is_none());
    }

    #[test]
    fn week_windows_are_monday_aligned() {
        let sel = WindowSelector::new(at(2024, 3, 13, 12));
        let cur = sel.current_week();
        assert_eq!(cur.start_date(), date(2024, 3, 11));
        assert_eq!(cur.label, "2024-W11");
        let prev = sel.previous_week();
        assert_eq!(prev.start_date(), date(2024, 3, 4));
        assert!(prev.contains(date(2024, 3, 10)));
        assert!(!prev.contains(date(2024, 3, 11)));
    }

    #[test]
    fn filter_preserves_order_and_reports_empty() {
        let sel = WindowSelector::new(at(2024, 3, 13, 12));
        let records = vec![
            order("a", date(2024, 3, 5)),
            order("b", date(2024, 2, 5)),
            order("c", date(2024, 3, 1)),
        ];
        let slice = sel.current_month().filter(&records);
        let ids: Vec<&str> = slice.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(slice.activity(), Activity::Observed);

        let week = sel.previous_week().filter(&records);
        let ids: Vec<&str> = week.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        let empty = WindowSelector::new(at(2024, 6, 1, 0)).previous_week().filter(&records);
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.activity(), Activity::NoActivity);
    }
}
