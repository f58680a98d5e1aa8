use chrono::{DateTime, Duration, SubsecRound, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::codec;
use crate::error::CoreError;
use crate::models::{RecurrenceRule, SeriesTemplate, Termination, Window};

/// RecurrenceManager: turns an anchor and a rule into the ordered sequence of
/// scheduled instants.
///
/// Calendar stepping (interval, weekday selection, wall-clock time across DST,
/// skipping days that do not exist in a month) is delegated to an
/// [`RRuleSet`] generated from the rule *shape* only. Termination is applied
/// here so that `Count(n)` counts from `recurrence_start` rather than from the
/// anchor, and so that the query window filters what is returned but never
/// what is counted.
///
/// The manager holds no mutable state; every query re-runs the generator from
/// the anchor, so it can be shared between any number of readers.
#[derive(Debug, Clone)]
pub struct RecurrenceManager {
    rule: RecurrenceRule,
    rrule_set: RRuleSet,
    recurrence_start: DateTime<Utc>,
    /// Inclusive upper bound from `recurrence_end` and `Until`
    end: Option<DateTime<Utc>>,
}

impl RecurrenceManager {
    /// Creates a manager for a rule anchored at `anchor_start`.
    ///
    /// # Behavior
    /// - Validate the rule invariants (`InvalidRule`)
    /// - Build the generator in the anchor's timezone so local wall time is
    ///   kept across DST changes
    /// - Combine `recurrence_end` and the rule's `Until` into one bound
    pub fn new(
        anchor_start: DateTime<Tz>,
        rule: RecurrenceRule,
        recurrence_start: DateTime<Utc>,
        recurrence_end: Option<DateTime<Utc>>,
    ) -> Result<Self, CoreError> {
        rule.validate()?;

        let rrule_string = generator_rule(anchor_start, &rule);
        let rrule_set = rrule_string.parse::<RRuleSet>().map_err(|e| {
            CoreError::InvalidRule(format!("Failed to parse RRULE '{}': {}", rrule_string, e))
        })?;

        let end = match (recurrence_end, rule.until_instant()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Ok(Self {
            rule,
            rrule_set,
            // The generator works in whole seconds
            recurrence_start: recurrence_start.trunc_subsecs(0),
            end,
        })
    }

    pub fn for_template(template: &SeriesTemplate) -> Result<Self, CoreError> {
        Self::new(
            template.anchor_local(),
            template.rule,
            template.recurrence_start,
            template.recurrence_end,
        )
    }

    /// Every instant the rule produces since `recurrence_start`, in order,
    /// with termination applied. Infinite for unbounded rules.
    fn series(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let limit = match self.rule.termination {
            Termination::Count(n) => n as usize,
            _ => usize::MAX,
        };
        let end = self.end;
        let recurrence_start = self.recurrence_start;

        (&self.rrule_set)
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .skip_while(move |dt| *dt < recurrence_start)
            .take(limit)
            .take_while(move |dt| end.map_or(true, |end| *dt <= end))
    }

    /// Lazily yields the instants inside `window`.
    pub fn occurrences(&self, window: Window) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.series()
            .take_while(move |dt| *dt < window.end)
            .skip_while(move |dt| *dt < window.start)
    }

    /// Collects the instants inside `window`.
    pub fn expand(&self, window: Window) -> Vec<DateTime<Utc>> {
        let occurrences: Vec<_> = self.occurrences(window).collect();
        tracing::debug!(
            count = occurrences.len(),
            window_start = %window.start,
            window_end = %window.end,
            "expanded recurrence window"
        );
        occurrences
    }

    /// Whether `instant` is one of the scheduled instants.
    pub fn produces(&self, instant: DateTime<Utc>) -> bool {
        self.series().find(|dt| *dt >= instant) == Some(instant)
    }

    /// Number of occurrences strictly before `instant`.
    pub fn count_before(&self, instant: DateTime<Utc>) -> u32 {
        let count = self.series().take_while(|dt| *dt < instant).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn first_occurrence(&self) -> Option<DateTime<Utc>> {
        self.series().next()
    }

    /// Finds the next occurrence strictly after the given time, looking no
    /// further than `horizon`.
    pub fn next_occurrence_after(
        &self,
        after: DateTime<Utc>,
        horizon: Duration,
    ) -> Option<DateTime<Utc>> {
        self.next_occurrences(after, 1, horizon).into_iter().next()
    }

    /// Preview up to `count` occurrences strictly after `after`.
    pub fn next_occurrences(
        &self,
        after: DateTime<Utc>,
        count: usize,
        horizon: Duration,
    ) -> Vec<DateTime<Utc>> {
        let limit = after + horizon;
        self.series()
            .take_while(|dt| *dt < limit)
            .skip_while(|dt| *dt <= after)
            .take(count)
            .collect()
    }
}

/// Expands a rule anchored at `anchor_start` over `window`.
pub fn expand(
    anchor_start: DateTime<Tz>,
    rule: &RecurrenceRule,
    recurrence_start: DateTime<Utc>,
    recurrence_end: Option<DateTime<Utc>>,
    window: Window,
) -> Result<Vec<DateTime<Utc>>, CoreError> {
    let manager = RecurrenceManager::new(anchor_start, *rule, recurrence_start, recurrence_end)?;
    Ok(manager.expand(window))
}

/// The DTSTART + RRULE text the generator is parsed from. Termination is left
/// out on purpose; it is applied by [`RecurrenceManager`].
fn generator_rule(anchor_start: DateTime<Tz>, rule: &RecurrenceRule) -> String {
    let shape = codec::encode(&rule.unbounded());
    if anchor_start.timezone() == chrono_tz::UTC {
        format!(
            "DTSTART:{}\nRRULE:{}",
            anchor_start.format("%Y%m%dT%H%M%SZ"),
            shape
        )
    } else {
        format!(
            "DTSTART;TZID={}:{}\nRRULE:{}",
            anchor_start.timezone().name(),
            anchor_start.format("%Y%m%dT%H%M%S"),
            shape
        )
    }
}
