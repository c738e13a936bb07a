use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::browser::{BrowserKind, HistoryRecord, RawRow};
use crate::error::{ExtractError, Result};
use crate::time;

/// Inclusive instant range; an absent bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ExtractError::InvalidRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Calendar days in `tz`: from the first instant of `start` through the
    /// last microsecond of `end`.
    pub fn from_dates<Tz: TimeZone>(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        tz: &Tz,
    ) -> Result<Self> {
        let start = start.and_then(|d| {
            d.and_hms_opt(0, 0, 0)
                .and_then(|t| tz.from_local_datetime(&t).earliest())
                .map(|t| t.with_timezone(&Utc))
        });
        let end = end.and_then(|d| {
            d.and_hms_micro_opt(23, 59, 59, 999_999)
                .and_then(|t| tz.from_local_datetime(&t).latest())
                .map(|t| t.with_timezone(&Utc))
        });
        Self::new(start, end)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| instant >= start) && self.end.is_none_or(|end| instant <= end)
    }
}

/// Decode and filter rows. Order is kept as given; rows whose visit time is
/// absent or outside `range` are dropped.
pub fn normalize<I>(
    rows: I,
    kind: BrowserKind,
    range: &DateRange,
) -> impl Iterator<Item = HistoryRecord> + use<I>
where
    I: IntoIterator<Item = RawRow>,
{
    let range = *range;
    rows.into_iter().filter_map(move |row| {
        let visited_at = time::decode(kind, row.last_visit)?;
        if !range.contains(visited_at) {
            return None;
        }
        Some(HistoryRecord {
            title: row.title.unwrap_or_default(),
            url: row.url,
            visited_at,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn gecko_row(url: &str, at: Option<DateTime<Utc>>) -> RawRow {
        RawRow {
            url: url.to_string(),
            title: Some(url.to_uppercase()),
            last_visit: at.map(|t| t.timestamp_micros()),
        }
    }

    #[test]
    fn rejects_inverted_range() {
        let err = DateRange::new(Some(utc(2023, 6, 2, 0)), Some(utc(2023, 6, 1, 0)))
            .expect_err("inverted");
        assert!(matches!(err, ExtractError::InvalidRange { .. }));
        assert!(DateRange::new(Some(utc(2023, 6, 1, 0)), Some(utc(2023, 6, 1, 0))).is_ok());
    }

    #[test]
    fn day_range_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let range = DateRange::from_dates(Some(day), Some(day), &Utc).expect("range");
        assert!(range.contains(utc(2023, 6, 1, 0)));
        assert!(range.contains(utc(2023, 6, 1, 23) + chrono::Duration::seconds(3599)));
        assert!(!range.contains(utc(2023, 6, 2, 0)));
        assert!(!range.contains(utc(2023, 5, 31, 23)));
    }

    #[test]
    fn day_range_follows_time_zone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let range = DateRange::from_dates(Some(day), None, &tz).expect("range");
        assert_eq!(range.start(), Some(utc(2023, 5, 31, 22)));
        assert_eq!(range.end(), None);
    }

    #[test]
    fn inverted_dates_are_rejected() {
        let a = NaiveDate::from_ymd_opt(2023, 6, 2).unwrap();
        let b = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert!(matches!(
            DateRange::from_dates(Some(a), Some(b), &Utc),
            Err(ExtractError::InvalidRange { .. })
        ));
    }

    #[test]
    fn filters_without_reordering() {
        let rows = vec![
            gecko_row("c", Some(utc(2023, 6, 3, 0))),
            gecko_row("b", Some(utc(2023, 6, 2, 0))),
            gecko_row("never", None),
            gecko_row("a", Some(utc(2023, 6, 1, 0))),
            gecko_row("z", Some(utc(2023, 5, 1, 0))),
        ];
        let range = DateRange::new(Some(utc(2023, 6, 1, 0)), Some(utc(2023, 6, 3, 0))).unwrap();
        let urls: Vec<_> = normalize(rows, BrowserKind::Gecko, &range)
            .map(|r| r.url)
            .collect();
        assert_eq!(urls, vec!["c", "b", "a"]);
    }

    #[test]
    fn gecko_zero_is_dropped_even_unbounded() {
        let rows = vec![RawRow {
            url: "https://example.com".into(),
            title: None,
            last_visit: Some(0),
        }];
        assert_eq!(
            normalize(rows, BrowserKind::Gecko, &DateRange::unbounded()).count(),
            0
        );
    }

    #[test]
    fn missing_title_becomes_empty() {
        let rows = vec![RawRow {
            url: "https://example.com".into(),
            title: None,
            last_visit: Some(13_330_087_200_000_000),
        }];
        let out: Vec<_> = normalize(rows, BrowserKind::WebKit, &DateRange::unbounded()).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "");
        assert_eq!(out[0].visited_at, utc(2023, 6, 1, 10));
    }

    #[test]
    fn output_is_exactly_the_in_range_subset() {
        let times: Vec<_> = (0..48).map(|h| utc(2023, 6, 1, 0) + chrono::Duration::hours(h)).collect();
        let rows: Vec<_> = times
            .iter()
            .rev()
            .enumerate()
            .map(|(i, t)| gecko_row(&format!("u{i}"), Some(*t)))
            .collect();
        let range = DateRange::new(Some(utc(2023, 6, 1, 12)), Some(utc(2023, 6, 2, 6))).unwrap();

        let expected: Vec<_> = rows
            .iter()
            .filter(|r| {
                let t = time::decode_gecko_time(r.last_visit).unwrap();
                t >= utc(2023, 6, 1, 12) && t <= utc(2023, 6, 2, 6)
            })
            .cloned()
            .collect();
        let out: Vec<_> = normalize(rows, BrowserKind::Gecko, &range).collect();
        assert_eq!(out.len(), expected.len());
        for (record, row) in out.iter().zip(&expected) {
            assert_eq!(record.url, row.url);
        }
    }
}
