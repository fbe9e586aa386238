//! Event list filtering: query parameters to predicates, ordering and
//! pagination.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::{LinkedEventsError, LinkedEventsResult};
use crate::models::{Event, EventStatus, EventTime, Pagination, Position};
use crate::translation::EVENT_TRANSLATED_FIELDS;

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*(d|h|m|s)?$").expect("duration pattern is valid"));

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Prefix of event filter parameters on keyword and place listings.
pub const EVENT_PARAM_PREFIX: &str = "event.";

/// Value of a query parameter, with blank values treated as absent.
pub fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn local_midnight(date: NaiveDate, tz: Tz, raw: &str) -> LinkedEventsResult<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| LinkedEventsError::InvalidTime(raw.to_string()))
}

/// Parse a time bound.
///
/// Dates and `today` resolve to local midnight; as an end bound
/// (`is_start == false`) they mean midnight of the following day. Other
/// values must be ISO 8601 date-times; those without an offset are taken in
/// local time.
pub fn parse_time(
    value: &str,
    is_start: bool,
    tz: Tz,
    now: DateTime<Utc>,
) -> LinkedEventsResult<EventTime> {
    let raw = value.trim();

    let date = if raw.eq_ignore_ascii_case("today") {
        Some(now.with_timezone(&tz).date_naive())
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    };
    if let Some(date) = date {
        let mut at = local_midnight(date, tz, raw)?;
        if !is_start {
            at += Duration::days(1);
        }
        return Ok(EventTime { at, has_time: false });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(EventTime { at: dt.with_timezone(&Utc), has_time: true });
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Ok(EventTime { at: dt.with_timezone(&Utc), has_time: true });
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            let local = tz
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| LinkedEventsError::InvalidTime(raw.to_string()))?;
            return Ok(EventTime { at: local.with_timezone(&Utc), has_time: true });
        }
    }

    Err(LinkedEventsError::InvalidTime(raw.to_string()))
}

/// `"2h"` → 2 hours. A bare number is seconds.
pub fn parse_duration(value: &str) -> LinkedEventsResult<Duration> {
    let normalized = value.trim().to_lowercase();
    let invalid = || LinkedEventsError::InvalidDuration(value.to_string());

    let captures = DURATION.captures(&normalized).ok_or_else(invalid)?;
    let amount: i64 = captures[1].parse().map_err(|_| invalid())?;
    let unit_seconds = match captures.get(2).map(|m| m.as_str()) {
        Some("d") => 24 * 3600,
        Some("h") => 3600,
        Some("m") => 60,
        _ => 1,
    };

    amount
        .checked_mul(unit_seconds)
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}

/// `west,south,east,north` in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bbox {
    pub fn parse(value: &str) -> LinkedEventsResult<Self> {
        let invalid = || LinkedEventsError::InvalidBbox(value.to_string());

        let coords = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        let [west, south, east, north] = coords[..] else {
            return Err(invalid());
        };
        if !coords.iter().all(|c| c.is_finite()) || west > east || south > north {
            return Err(invalid());
        }
        Ok(Self { west, south, east, north })
    }

    pub fn contains(&self, position: &Position) -> bool {
        (self.west..=self.east).contains(&position.longitude)
            && (self.south..=self.north).contains(&position.latitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurring {
    Super,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    StartTime,
    EndTime,
    DaysLeft,
    LastModifiedTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    /// Comma separated field names, `-` for descending. Unknown names are
    /// ignored.
    pub fn parse_list(value: &str) -> Vec<SortKey> {
        value
            .split(',')
            .filter_map(|raw| {
                let raw = raw.trim();
                let (descending, name) = match raw.strip_prefix('-') {
                    Some(name) => (true, name),
                    None => (false, raw),
                };
                let field = match name {
                    "start_time" => SortField::StartTime,
                    "end_time" => SortField::EndTime,
                    "days_left" => SortField::DaysLeft,
                    "last_modified_time" => SortField::LastModifiedTime,
                    _ => return None,
                };
                Some(SortKey { field, descending })
            })
            .collect()
    }

    fn value(&self, event: &Event) -> Option<i64> {
        match self.field {
            SortField::StartTime => event.start_time.map(|t| t.timestamp_millis()),
            SortField::EndTime => event.end_time.map(|t| t.timestamp_millis()),
            SortField::DaysLeft => event.days_left(),
            SortField::LastModifiedTime => Some(event.last_modified_time.timestamp_millis()),
        }
    }

    /// Missing values sort after present ones in ascending order.
    fn compare(&self, a: &Event, b: &Event) -> Ordering {
        let ordering = match (self.value(a), self.value(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if self.descending { ordering.reverse() } else { ordering }
    }
}

const DEFAULT_SORT: [SortKey; 1] = [SortKey {
    field: SortField::LastModifiedTime,
    descending: true,
}];

/// Conjunction of event predicates built from query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub text: Option<String>,
    pub last_modified_since: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub bbox: Option<Bbox>,
    pub data_source: Option<String>,
    pub locations: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub recurring: Option<Recurring>,
    pub max_duration: Option<Duration>,
    pub min_duration: Option<Duration>,
    pub only_scheduled: bool,
    pub sort: Vec<SortKey>,
}

fn id_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

impl EventFilter {
    /// Parse the event list query. Only scheduled events are kept unless
    /// `show_all` is present.
    pub fn from_params(
        params: &HashMap<String, String>,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> LinkedEventsResult<Self> {
        let time = |key: &str, is_start: bool| -> LinkedEventsResult<Option<DateTime<Utc>>> {
            param(params, key)
                .map(|v| parse_time(v, is_start, tz, now).map(|t| t.at))
                .transpose()
        };

        Ok(Self {
            text: param(params, "text").map(str::to_lowercase),
            last_modified_since: time("last_modified_since", false)?,
            start: time("start", true)?,
            end: time("end", false)?,
            bbox: param(params, "bbox").map(Bbox::parse).transpose()?,
            data_source: param(params, "data_source").map(str::to_string),
            locations: param(params, "location").map(id_list),
            keywords: param(params, "keyword").map(id_list),
            recurring: param(params, "recurring").and_then(|v| match v.to_lowercase().as_str() {
                "super" => Some(Recurring::Super),
                "sub" => Some(Recurring::Sub),
                _ => None,
            }),
            max_duration: param(params, "max_duration").map(parse_duration).transpose()?,
            min_duration: param(params, "min_duration").map(parse_duration).transpose()?,
            only_scheduled: !params.contains_key("show_all"),
            sort: param(params, "sort").map(SortKey::parse_list).unwrap_or_default(),
        })
    }

    /// Event predicates of a keyword or place listing restricted to used
    /// records. No status filter applies there.
    pub fn for_used_records(
        params: &HashMap<String, String>,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> LinkedEventsResult<Self> {
        let cleaned = clean_event_params(params);
        Ok(Self {
            only_scheduled: false,
            sort: Vec::new(),
            ..Self::from_params(&cleaned, tz, now)?
        })
    }

    /// Whether `days_left` should appear in representations.
    pub fn emits_days_left(&self) -> bool {
        self.sort.iter().any(|key| key.field == SortField::DaysLeft)
    }

    /// Check every predicate. `position_of` resolves a place id to its
    /// coordinates for the bounding box test.
    pub fn matches<F>(&self, event: &Event, position_of: F) -> bool
    where
        F: Fn(&str) -> Option<Position>,
    {
        if self.only_scheduled && event.event_status != EventStatus::EventScheduled {
            return false;
        }

        if let Some(text) = &self.text {
            let found = EVENT_TRANSLATED_FIELDS.iter().any(|field| {
                event
                    .text
                    .all_values(field)
                    .any(|value| value.to_lowercase().contains(text.as_str()))
            });
            if !found {
                return false;
            }
        }

        if let Some(since) = self.last_modified_since {
            if event.last_modified_time < since {
                return false;
            }
        }

        if let Some(start) = self.start {
            let ends_after = event.end_time.is_some_and(|t| t > start);
            let starts_after = event.start_time.is_some_and(|t| t >= start);
            if !(ends_after || starts_after) {
                return false;
            }
        }

        if let Some(end) = self.end {
            let ends_before = event.end_time.is_some_and(|t| t < end);
            let starts_before = event.start_time.is_some_and(|t| t <= end);
            if !(ends_before || starts_before) {
                return false;
            }
        }

        if let Some(bbox) = &self.bbox {
            let inside = event
                .location
                .as_deref()
                .and_then(&position_of)
                .is_some_and(|position| bbox.contains(&position));
            if !inside {
                return false;
            }
        }

        if let Some(data_source) = &self.data_source {
            if &event.data_source != data_source {
                return false;
            }
        }

        if let Some(locations) = &self.locations {
            if !event.location.as_ref().is_some_and(|l| locations.contains(l)) {
                return false;
            }
        }

        if let Some(keywords) = &self.keywords {
            if !event.keywords.iter().any(|k| keywords.contains(k)) {
                return false;
            }
        }

        match self.recurring {
            Some(Recurring::Super) if !event.is_recurring_super => return false,
            Some(Recurring::Sub) if event.is_recurring_super => return false,
            _ => {}
        }

        if let Some(max) = self.max_duration {
            if !event.duration().is_some_and(|d| d <= max) {
                return false;
            }
        }

        if let Some(min) = self.min_duration {
            if !event.duration().is_some_and(|d| d >= min) {
                return false;
            }
        }

        true
    }

    /// Predicates with no SQL translation: free text, bbox and duration.
    /// The rest can be evaluated by the database.
    pub fn has_memory_predicates(&self) -> bool {
        self.text.is_some()
            || self.bbox.is_some()
            || self.max_duration.is_some()
            || self.min_duration.is_some()
    }

    /// The requested sort keys, newest modification first when none.
    pub fn sort_keys(&self) -> &[SortKey] {
        if self.sort.is_empty() { &DEFAULT_SORT } else { &self.sort }
    }

    /// Order by [`Self::sort_keys`]. Ties break on id.
    pub fn sort(&self, events: &mut [Event]) {
        let keys = self.sort_keys();
        events.sort_by(|a, b| {
            keys.iter()
                .map(|key| key.compare(a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });
    }
}

/// Copy of the query with `event.` prefixed keys renamed to their bare
/// form. Prefixed keys win over bare ones.
pub fn clean_event_params(params: &HashMap<String, String>) -> HashMap<String, String> {
    let mut cleaned: HashMap<String, String> = params
        .iter()
        .filter(|(key, _)| !key.starts_with(EVENT_PARAM_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in params {
        if let Some(bare) = key.strip_prefix(EVENT_PARAM_PREFIX) {
            cleaned.insert(bare.to_string(), value.clone());
        }
    }
    cleaned
}

/// Read `page` and `page_size`. Page must be a positive integer whose row
/// offset fits a SQL `BIGINT`; a missing or malformed page size falls back
/// to the default and is capped.
pub fn pagination(params: &HashMap<String, String>) -> LinkedEventsResult<Pagination> {
    let page = match param(params, "page") {
        None => 1,
        Some(raw) => match raw.parse::<u64>() {
            Ok(page) if page >= 1 => page,
            _ => return Err(LinkedEventsError::InvalidPage),
        },
    };
    let page_size = param(params, "page_size")
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|size| *size >= 1)
        .map(|size| size.min(Pagination::MAX_PAGE_SIZE))
        .unwrap_or(Pagination::DEFAULT_PAGE_SIZE);

    let offset = (page - 1).checked_mul(page_size);
    if offset.is_none_or(|offset| offset > i64::MAX as u64) {
        return Err(LinkedEventsError::InvalidPage);
    }

    Ok(Pagination { page, page_size })
}

/// Reject pages past the end; the first page always exists.
pub fn check_page(page: &Pagination, count: u64) -> LinkedEventsResult<()> {
    if page.page > 1 && page.offset() >= count {
        return Err(LinkedEventsError::InvalidPage);
    }
    Ok(())
}

/// Filter, order and page an in-memory event collection.
pub fn apply<F>(
    events: impl IntoIterator<Item = Event>,
    filter: &EventFilter,
    page: &Pagination,
    position_of: F,
) -> (Vec<Event>, u64)
where
    F: Fn(&str) -> Option<Position>,
{
    let mut matched: Vec<Event> = events
        .into_iter()
        .filter(|event| filter.matches(event, &position_of))
        .collect();
    filter.sort(&mut matched);

    let count = matched.len() as u64;
    let items = matched
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.page_size as usize)
        .collect();
    (items, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventFields, NewEvent, TextColumns};
    use chrono::Timelike;

    const HELSINKI: Tz = chrono_tz::Europe::Helsinki;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 1, 15, 10, 30, 0).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn event(id: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Event {
        let mut event = NewEvent {
            id: id.into(),
            data_source: "helsinki".into(),
            publisher: "org:1".into(),
            created_time: start,
            fields: EventFields::default(),
        }
        .into_event();
        event.start_time = Some(start);
        event.end_time = end;
        event
    }

    fn no_places(_: &str) -> Option<Position> {
        None
    }

    fn ids(filter: &EventFilter, events: &[Event]) -> Vec<String> {
        let mut ids: Vec<String> = events
            .iter()
            .filter(|e| filter.matches(e, no_places))
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_parse_time_date_start_and_end() {
        let start = parse_time("2014-01-15", true, HELSINKI, now()).unwrap();
        assert_eq!(start.at, utc(2014, 1, 14, 22, 0));
        assert!(!start.has_time);

        let end = parse_time("2014-01-15", false, HELSINKI, now()).unwrap();
        assert_eq!(end.at, utc(2014, 1, 15, 22, 0));
    }

    #[test]
    fn test_parse_time_today() {
        let start = parse_time("Today", true, HELSINKI, now()).unwrap();
        assert_eq!(start.at, utc(2014, 1, 14, 22, 0));
        let end = parse_time("today", false, HELSINKI, now()).unwrap();
        assert_eq!(end.at, utc(2014, 1, 15, 22, 0));
    }

    #[test]
    fn test_parse_time_with_offsets() {
        let expected = utc(2014, 10, 29, 10, 0);
        for raw in [
            "2014-10-29T12:00:00+02:00",
            "2014-10-29T12:00:00+0200",
            "2014-10-29T10:00:00Z",
            "2014-10-29T10:00:00.000+0000",
        ] {
            let parsed = parse_time(raw, true, HELSINKI, now()).unwrap();
            assert_eq!(parsed.at, expected, "{raw}");
            assert!(parsed.has_time);
        }
    }

    #[test]
    fn test_parse_time_naive_is_local() {
        let parsed = parse_time("2014-06-01T12:00", true, HELSINKI, now()).unwrap();
        assert_eq!(parsed.at, utc(2014, 6, 1, 9, 0));
        assert_eq!(parsed.at.with_timezone(&HELSINKI).hour(), 12);
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        let err = parse_time("next week", true, HELSINKI, now()).unwrap_err();
        assert_eq!(err.to_string(), "time in invalid format (try ISO 8601 or yyyy-mm-dd)");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::seconds(7200));
        assert_eq!(parse_duration("90").unwrap(), Duration::seconds(90));
        assert_eq!(parse_duration(" 1D ").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("15 m").unwrap(), Duration::minutes(15));
        let err = parse_duration("abc").unwrap_err();
        assert_eq!(err.to_string(), "Invalid duration supplied. Try '1d' or '2h'.");
        assert!(parse_duration("-5h").is_err());
    }

    #[test]
    fn test_bbox() {
        let bbox = Bbox::parse("24.9348,60.1762,24.9681,60.1889").unwrap();
        assert!(bbox.contains(&Position { longitude: 24.95, latitude: 60.18 }));
        assert!(!bbox.contains(&Position { longitude: 25.0, latitude: 60.18 }));
        assert!(Bbox::parse("1,2,3").is_err());
        assert!(Bbox::parse("a,b,c,d").is_err());
        assert!(Bbox::parse("5,0,1,1").is_err());
    }

    #[test]
    fn test_start_end_returns_intersecting_events() {
        let events = vec![
            event("a:before", utc(2014, 1, 10, 10, 0), Some(utc(2014, 1, 10, 12, 0))),
            event("a:overlap-start", utc(2014, 1, 14, 10, 0), Some(utc(2014, 1, 16, 10, 0))),
            event("a:inside", utc(2014, 1, 17, 10, 0), Some(utc(2014, 1, 17, 12, 0))),
            event("a:overlap-end", utc(2014, 1, 20, 10, 0), Some(utc(2014, 1, 25, 10, 0))),
            event("a:after", utc(2014, 1, 22, 10, 0), Some(utc(2014, 1, 22, 12, 0))),
            event("a:spanning", utc(2014, 1, 1, 10, 0), Some(utc(2014, 2, 1, 10, 0))),
        ];

        let filter = EventFilter::from_params(
            &params(&[("start", "2014-01-15"), ("end", "2014-01-20")]),
            HELSINKI,
            now(),
        )
        .unwrap();

        assert_eq!(
            ids(&filter, &events),
            vec!["a:inside", "a:overlap-end", "a:overlap-start", "a:spanning"]
        );
    }

    #[test]
    fn test_duration_bounds() {
        let events = vec![
            event("d:short", utc(2014, 1, 15, 10, 0), Some(utc(2014, 1, 15, 10, 30))),
            event("d:hour", utc(2014, 1, 15, 10, 0), Some(utc(2014, 1, 15, 11, 0))),
            event("d:long", utc(2014, 1, 15, 10, 0), Some(utc(2014, 1, 15, 14, 0))),
            event("d:open", utc(2014, 1, 15, 10, 0), None),
        ];

        let max = EventFilter::from_params(&params(&[("max_duration", "1h")]), HELSINKI, now()).unwrap();
        assert_eq!(ids(&max, &events), vec!["d:hour", "d:short"]);

        let min = EventFilter::from_params(&params(&[("min_duration", "1h")]), HELSINKI, now()).unwrap();
        assert_eq!(ids(&min, &events), vec!["d:hour", "d:long"]);
    }

    #[test]
    fn test_recurring_partitions_collection() {
        let mut parent = event("r:super", now(), None);
        parent.is_recurring_super = true;
        let events = vec![parent, event("r:one", now(), None), event("r:two", now(), None)];

        let sup = EventFilter::from_params(&params(&[("recurring", "super")]), HELSINKI, now()).unwrap();
        let sub = EventFilter::from_params(&params(&[("recurring", "SUB")]), HELSINKI, now()).unwrap();
        let other = EventFilter::from_params(&params(&[("recurring", "both")]), HELSINKI, now()).unwrap();

        let supers = ids(&sup, &events);
        let subs = ids(&sub, &events);
        assert_eq!(supers, vec!["r:super"]);
        assert_eq!(subs, vec!["r:one", "r:two"]);
        assert_eq!(supers.len() + subs.len(), events.len());
        assert_eq!(ids(&other, &events).len(), 3);
    }

    #[test]
    fn test_text_searches_every_language() {
        let mut swedish = event("t:sv", now(), None);
        swedish.text = TextColumns::new().with("description_sv", "Stor Konsert i parken");
        let mut finnish = event("t:fi", now(), None);
        finnish.text = TextColumns::new().with("name_fi", "Teatteri");
        let events = vec![swedish, finnish];

        let filter = EventFilter::from_params(&params(&[("text", "KONSERT")]), HELSINKI, now()).unwrap();
        assert_eq!(ids(&filter, &events), vec!["t:sv"]);
    }

    #[test]
    fn test_membership_and_status_filters() {
        let mut located = event("m:1", now(), None);
        located.location = Some("tprek:1".into());
        located.keywords = vec!["yso:p1".into(), "yso:p2".into()];
        let mut cancelled = event("m:2", now(), None);
        cancelled.event_status = EventStatus::EventCancelled;
        let events = vec![located, cancelled];

        let by_location = EventFilter::from_params(&params(&[("location", "tprek:1,tprek:9")]), HELSINKI, now()).unwrap();
        assert_eq!(ids(&by_location, &events), vec!["m:1"]);

        let by_keyword = EventFilter::from_params(&params(&[("keyword", "yso:p2")]), HELSINKI, now()).unwrap();
        assert_eq!(ids(&by_keyword, &events), vec!["m:1"]);

        let show_all = EventFilter::from_params(&params(&[("show_all", "")]), HELSINKI, now()).unwrap();
        assert_eq!(ids(&show_all, &events), vec!["m:1", "m:2"]);

        let blank = EventFilter::from_params(&params(&[("location", "  ")]), HELSINKI, now()).unwrap();
        assert!(blank.locations.is_none());
    }

    #[test]
    fn test_bbox_filter_uses_place_positions() {
        let mut inside = event("b:in", now(), None);
        inside.location = Some("tprek:in".into());
        let mut outside = event("b:out", now(), None);
        outside.location = Some("tprek:out".into());

        let filter = EventFilter::from_params(&params(&[("bbox", "24,60,25,61")]), HELSINKI, now()).unwrap();
        let position_of = |id: &str| match id {
            "tprek:in" => Some(Position { longitude: 24.9, latitude: 60.2 }),
            _ => Some(Position { longitude: 10.0, latitude: 50.0 }),
        };

        assert!(filter.matches(&inside, position_of));
        assert!(!filter.matches(&outside, position_of));
    }

    #[test]
    fn test_sort_and_default_order() {
        let mut a = event("s:a", utc(2014, 1, 3, 0, 0), None);
        a.last_modified_time = utc(2014, 1, 1, 0, 0);
        let mut b = event("s:b", utc(2014, 1, 1, 0, 0), Some(utc(2014, 1, 5, 0, 0)));
        b.last_modified_time = utc(2014, 1, 3, 0, 0);
        let mut c = event("s:c", utc(2014, 1, 2, 0, 0), Some(utc(2014, 1, 3, 0, 0)));
        c.last_modified_time = utc(2014, 1, 2, 0, 0);

        let mut events = vec![a.clone(), b.clone(), c.clone()];
        EventFilter::default().sort(&mut events);
        assert_eq!(events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["s:b", "s:c", "s:a"]);

        let filter = EventFilter::from_params(&params(&[("sort", "start_time")]), HELSINKI, now()).unwrap();
        filter.sort(&mut events);
        assert_eq!(events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["s:b", "s:c", "s:a"]);

        let filter = EventFilter::from_params(&params(&[("sort", "-days_left,bogus")]), HELSINKI, now()).unwrap();
        assert!(filter.emits_days_left());
        filter.sort(&mut events);
        assert_eq!(events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["s:a", "s:b", "s:c"]);
    }

    #[test]
    fn test_memory_predicates() {
        let sql_only = EventFilter::from_params(
            &params(&[("start", "today"), ("keyword", "yso:p1"), ("data_source", "helsinki")]),
            HELSINKI,
            now(),
        )
        .unwrap();
        assert!(!sql_only.has_memory_predicates());
        assert_eq!(sql_only.sort_keys(), &DEFAULT_SORT);

        for pair in [
            ("text", "jazz"),
            ("bbox", "24.9,60.1,25.0,60.2"),
            ("max_duration", "2h"),
            ("min_duration", "1d"),
        ] {
            let filter = EventFilter::from_params(&params(&[pair]), HELSINKI, now()).unwrap();
            assert!(filter.has_memory_predicates(), "{}", pair.0);
        }
    }

    #[test]
    fn test_clean_event_params() {
        let cleaned = clean_event_params(&params(&[
            ("event.start", "today"),
            ("data_source", "yso"),
            ("event.data_source", "helsinki"),
        ]));
        assert_eq!(cleaned.get("start").map(String::as_str), Some("today"));
        assert_eq!(cleaned.get("data_source").map(String::as_str), Some("helsinki"));
        assert!(!cleaned.contains_key("event.start"));

        let filter = EventFilter::for_used_records(&params(&[("event.start", "today")]), HELSINKI, now()).unwrap();
        assert!(!filter.only_scheduled);
        assert!(filter.start.is_some());
    }

    #[test]
    fn test_pagination() {
        assert_eq!(pagination(&params(&[])).unwrap(), Pagination::default());
        assert_eq!(
            pagination(&params(&[("page", "2"), ("page_size", "500")])).unwrap(),
            Pagination { page: 2, page_size: 100 }
        );
        assert_eq!(pagination(&params(&[("page_size", "x")])).unwrap().page_size, 20);
        assert!(matches!(pagination(&params(&[("page", "0")])), Err(LinkedEventsError::InvalidPage)));
        assert!(matches!(pagination(&params(&[("page", "abc")])), Err(LinkedEventsError::InvalidPage)));

        assert!(check_page(&Pagination::default(), 0).is_ok());
        assert!(check_page(&Pagination { page: 2, page_size: 20 }, 21).is_ok());
        assert!(check_page(&Pagination { page: 2, page_size: 20 }, 20).is_err());
    }

    #[test]
    fn test_huge_page_is_invalid_not_overflow() {
        let max = u64::MAX.to_string();
        assert!(matches!(pagination(&params(&[("page", max.as_str())])), Err(LinkedEventsError::InvalidPage)));
        assert!(matches!(
            pagination(&params(&[("page", "100000000000000000"), ("page_size", "100")])),
            Err(LinkedEventsError::InvalidPage)
        ));

        let unchecked = Pagination { page: u64::MAX, page_size: 100 };
        assert!(matches!(check_page(&unchecked, 3), Err(LinkedEventsError::InvalidPage)));
    }
}
