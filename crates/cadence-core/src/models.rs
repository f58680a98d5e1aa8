use chrono::{DateTime, SubsecRound, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

// ============================================================================
// Recurrence rule value types
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Yearly => write!(f, "yearly"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" | "annually" => Ok(Frequency::Yearly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

/// A set of weekdays stored as a bitmask, iterated Monday first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    pub fn single(day: Weekday) -> Self {
        let mut set = Self::EMPTY;
        set.insert(day);
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(|day| self.contains(*day))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

/// How a rule stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    #[default]
    Unbounded,
    /// Total number of occurrences produced since the recurrence start.
    Count(u32),
    /// Last instant (inclusive) an occurrence may fall on.
    Until(DateTime<Utc>),
}

/// Structured recurrence configuration. The persisted form is the rule string
/// produced by [`crate::codec::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    /// Only meaningful for weekly rules; empty means "the anchor's weekday".
    pub by_weekday: WeekdaySet,
    pub termination: Termination,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            by_weekday: WeekdaySet::EMPTY,
            termination: Termination::Unbounded,
        }
    }

    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn on<I: IntoIterator<Item = Weekday>>(mut self, days: I) -> Self {
        self.by_weekday = days.into_iter().collect();
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.termination = Termination::Count(count);
        self
    }

    /// Ends the rule at `until`, cut to whole seconds as stored.
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.termination = Termination::Until(until.trunc_subsecs(0));
        self
    }

    /// The same rule shape with the termination removed.
    pub fn unbounded(mut self) -> Self {
        self.termination = Termination::Unbounded;
        self
    }

    pub fn until_instant(&self) -> Option<DateTime<Utc>> {
        match self.termination {
            Termination::Until(until) => Some(until),
            _ => None,
        }
    }

    /// Checks the invariants a rule must hold before it may be stored.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval < 1 {
            return Err(CoreError::InvalidRule(
                "interval must be at least 1".to_string(),
            ));
        }
        if self.interval > u32::from(u16::MAX) {
            return Err(CoreError::InvalidRule(format!(
                "interval {} is too large",
                self.interval
            )));
        }
        if self.termination == Termination::Count(0) {
            return Err(CoreError::InvalidRule(
                "count must be at least 1".to_string(),
            ));
        }
        if let Termination::Until(until) = self.termination {
            if until.nanosecond() != 0 {
                return Err(CoreError::InvalidRule(format!(
                    "until {} has a fraction of a second",
                    until
                )));
            }
        }
        if !self.by_weekday.is_empty() && self.frequency != Frequency::Weekly {
            return Err(CoreError::InvalidRule(format!(
                "weekday selection is only supported for weekly rules, not {}",
                self.frequency
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Template payload
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid priority: {0}")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Priority::None),
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::None => write!(f, "none"),
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "completed" => Ok(Status::Completed),
            "cancelled" => Ok(Status::Cancelled),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Completed => write!(f, "completed"),
            Status::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The data every occurrence of a series inherits by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplatePayload {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub location: Option<String>,
    pub color: Option<String>,
}

impl TemplatePayload {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A partial payload. `None` leaves a field alone; for nullable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub location: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub color: Option<Option<String>>,
}

impl PayloadPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &PayloadPatch::default()
    }

    /// Overlays this patch on `base`, field by field.
    pub fn apply(&self, base: &TemplatePayload) -> TemplatePayload {
        TemplatePayload {
            title: self.title.clone().unwrap_or_else(|| base.title.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| base.description.clone()),
            priority: self.priority.unwrap_or(base.priority),
            status: self.status.unwrap_or(base.status),
            location: self
                .location
                .clone()
                .unwrap_or_else(|| base.location.clone()),
            color: self.color.clone().unwrap_or_else(|| base.color.clone()),
        }
    }

    /// Combines two patches; fields set in `later` win.
    pub fn merged_with(&self, later: &PayloadPatch) -> PayloadPatch {
        PayloadPatch {
            title: later.title.clone().or_else(|| self.title.clone()),
            description: later
                .description
                .clone()
                .or_else(|| self.description.clone()),
            priority: later.priority.or(self.priority),
            status: later.status.or(self.status),
            location: later.location.clone().or_else(|| self.location.clone()),
            color: later.color.clone().or_else(|| self.color.clone()),
        }
    }
}

// ============================================================================
// Series, overrides and exceptions
// ============================================================================

/// The master record of a recurring event or task.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTemplate {
    /// Primary key, UUIDv7 for time-ordered performance
    pub id: Uuid,
    /// Owning tenant
    pub company_id: Uuid,
    /// First occurrence, in UTC; local wall time is taken from `timezone`
    pub anchor_start: DateTime<Utc>,
    pub timezone: Tz,
    pub rule: RecurrenceRule,
    /// First instant the rule applies from
    pub recurrence_start: DateTime<Utc>,
    /// Cached upper bound of the series (inclusive)
    pub recurrence_end: Option<DateTime<Utc>>,
    pub fields: TemplatePayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SeriesTemplate {
    pub fn anchor_local(&self) -> DateTime<Tz> {
        self.anchor_start.with_timezone(&self.timezone)
    }

    /// The tighter of `recurrence_end` and the rule's `Until`.
    pub fn effective_end(&self) -> Option<DateTime<Utc>> {
        match (self.recurrence_end, self.rule.until_instant()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Data required to create a new series
#[derive(Debug, Clone)]
pub struct NewSeriesData {
    pub company_id: Uuid,
    pub anchor_start: DateTime<Utc>,
    /// IANA timezone name
    pub timezone: String,
    pub rule: RecurrenceRule,
    /// Defaults to `anchor_start`
    pub recurrence_start: Option<DateTime<Utc>>,
    pub fields: TemplatePayload,
}

/// A persisted per-occurrence field diff, keyed by the occurrence's original instant.
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceOverride {
    pub series_id: Uuid,
    /// Original scheduled instant; the key, never the displayed time
    pub occurrence_at: DateTime<Utc>,
    pub fields: PayloadPatch,
    pub created_at: DateTime<Utc>,
}

/// Marks one occurrence as removed from the series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceException {
    pub series_id: Uuid,
    pub occurrence_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Computed occurrences
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OccurrenceKind {
    /// Inherits the template fields unchanged
    Base,
    /// Template fields overlaid with the stored patch
    Overridden(PayloadPatch),
}

/// One concrete, user-visible occurrence of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub series_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub kind: OccurrenceKind,
    /// Effective fields after the override merge
    pub fields: TemplatePayload,
}

impl Occurrence {
    pub fn is_override(&self) -> bool {
        matches!(self.kind, OccurrenceKind::Overridden(_))
    }
}

/// Half-open time range `[start, end)` occurrences are requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if end <= start {
            return Err(CoreError::InvalidInput(format!(
                "window end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

// ============================================================================
// Editing
// ============================================================================

/// Scope for edits to a recurring series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Affect only the selected occurrence
    Single,
    /// Split the series at the selected occurrence and edit the tail
    Future,
    /// Modify the template itself
    Series,
}

impl fmt::Display for EditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditScope::Single => write!(f, "single"),
            EditScope::Future => write!(f, "future"),
            EditScope::Series => write!(f, "series"),
        }
    }
}

impl FromStr for EditScope {
    type Err = ParseEditScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "occurrence" | "this" => Ok(EditScope::Single),
            "future" | "this_and_future" => Ok(EditScope::Future),
            "series" | "entire" | "all" => Ok(EditScope::Series),
            _ => Err(ParseEditScopeError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid edit scope: {0}")]
pub struct ParseEditScopeError(String);

/// Field changes (and optionally a new rule) applied by an edit.
#[derive(Debug, Clone, Default)]
pub struct SeriesEdit {
    pub fields: PayloadPatch,
    /// Not accepted for single-occurrence edits
    pub rule: Option<RecurrenceRule>,
}

/// Which part of a series' cached occurrence views a mutation may affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRange {
    All,
    /// Every window that reaches `from` or later
    From(DateTime<Utc>),
    /// Windows containing this instant
    Instant(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub series_id: Uuid,
    pub range: CacheRange,
}

impl CacheKey {
    pub fn all(series_id: Uuid) -> Self {
        Self {
            series_id,
            range: CacheRange::All,
        }
    }

    pub fn starting_at(series_id: Uuid, from: DateTime<Utc>) -> Self {
        Self {
            series_id,
            range: CacheRange::From(from),
        }
    }

    pub fn instant(series_id: Uuid, instant: DateTime<Utc>) -> Self {
        Self {
            series_id,
            range: CacheRange::Instant(instant),
        }
    }

    /// Whether a cached view of `(series_id, window)` must be dropped.
    pub fn affects(&self, series_id: Uuid, window: &Window) -> bool {
        if self.series_id != series_id {
            return false;
        }
        match self.range {
            CacheRange::All => true,
            CacheRange::From(from) => window.end > from,
            CacheRange::Instant(instant) => window.contains(instant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_weekday_set_iterates_monday_first() {
        let set: WeekdaySet = [Weekday::Fri, Weekday::Mon, Weekday::Wed].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
        assert!(!set.contains(Weekday::Sun));
    }

    #[test]
    fn test_rule_validation() {
        assert!(RecurrenceRule::new(Frequency::Daily).validate().is_ok());
        assert!(matches!(
            RecurrenceRule::new(Frequency::Daily).interval(0).validate(),
            Err(CoreError::InvalidRule(_))
        ));
        assert!(matches!(
            RecurrenceRule::new(Frequency::Weekly).count(0).validate(),
            Err(CoreError::InvalidRule(_))
        ));
        assert!(matches!(
            RecurrenceRule::new(Frequency::Monthly).on([Weekday::Mon]).validate(),
            Err(CoreError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_until_is_whole_seconds() {
        let until = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let fractional = until + Duration::milliseconds(250);

        let built = RecurrenceRule::new(Frequency::Daily).until(fractional);
        assert_eq!(built.termination, Termination::Until(until));
        assert!(built.validate().is_ok());

        let literal = RecurrenceRule {
            termination: Termination::Until(fractional),
            ..RecurrenceRule::new(Frequency::Daily)
        };
        assert!(matches!(literal.validate(), Err(CoreError::InvalidRule(_))));
    }

    #[test]
    fn test_patch_apply_and_clear() {
        let base = TemplatePayload {
            title: "Standup".to_string(),
            description: Some("Daily sync".to_string()),
            location: Some("Room 1".to_string()),
            ..Default::default()
        };
        let patch = PayloadPatch {
            title: Some("Retro".to_string()),
            location: Some(None),
            ..Default::default()
        };

        let merged = patch.apply(&base);
        assert_eq!(merged.title, "Retro");
        assert_eq!(merged.description.as_deref(), Some("Daily sync"));
        assert_eq!(merged.location, None);
    }

    #[test]
    fn test_patch_merge_prefers_later() {
        let first = PayloadPatch {
            title: Some("A".to_string()),
            color: Some(Some("red".to_string())),
            ..Default::default()
        };
        let second = PayloadPatch::title("B");

        let merged = first.merged_with(&second);
        assert_eq!(merged.title.as_deref(), Some("B"));
        assert_eq!(merged.color, Some(Some("red".to_string())));
    }

    #[test]
    fn test_patch_json_keeps_cleared_fields() {
        let patch = PayloadPatch {
            description: Some(None),
            priority: Some(Priority::High),
            ..Default::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        let back: PayloadPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, patch);
        assert!(!json.contains("title"));
    }

    #[test]
    fn test_edit_scope_from_str() {
        assert_eq!("single".parse::<EditScope>().unwrap(), EditScope::Single);
        assert_eq!("this".parse::<EditScope>().unwrap(), EditScope::Single);
        assert_eq!("FUTURE".parse::<EditScope>().unwrap(), EditScope::Future);
        assert_eq!("all".parse::<EditScope>().unwrap(), EditScope::Series);
        assert!("sometimes".parse::<EditScope>().is_err());
    }

    #[test]
    fn test_window_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let window = Window::new(start, end).unwrap();
        assert!(window.contains(start));
        assert!(!window.contains(end));
        assert!(Window::new(end, start).is_err());
    }

    #[test]
    fn test_cache_key_affects() {
        let series_id = Uuid::now_v7();
        let boundary = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let early = Window::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let late = Window::new(boundary, boundary + Duration::days(7)).unwrap();

        let key = CacheKey::starting_at(series_id, boundary);
        assert!(!key.affects(series_id, &early));
        assert!(key.affects(series_id, &late));
        assert!(!key.affects(Uuid::now_v7(), &late));
    }
}
