use cadence_core::config::EngineConfig;
use cadence_core::db::establish_connection;
use cadence_core::editor::{InvalidationSink, SeriesEditor};
use cadence_core::error::CoreError;
use cadence_core::materialization::Materializer;
use cadence_core::models::*;
use cadence_core::repository::{OverrideStore, SeriesSplit, SqliteRepository, TemplateStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

/// Helper function to create a test database
async fn setup_test_db() -> (SqliteRepository, SqlitePool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    (SqliteRepository::new(pool.clone()), pool, temp_dir)
}

/// Monday 2024-01-`day` at 09:00 UTC
fn jan(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap()
}

fn january() -> Window {
    Window::new(jan(1), jan(29)).unwrap()
}

/// Helper function to create a weekly series starting Monday Jan 1
async fn create_weekly(repo: &SqliteRepository, title: &str, rule: RecurrenceRule) -> SeriesTemplate {
    SeriesEditor::new(repo)
        .create_series(NewSeriesData {
            company_id: Uuid::nil(),
            anchor_start: jan(1),
            timezone: "UTC".to_string(),
            rule,
            recurrence_start: None,
            fields: TemplatePayload::titled(title),
        })
        .await
        .expect("Failed to create test series")
}

async fn materialize(repo: &SqliteRepository, series_id: Uuid, window: Window) -> Vec<Occurrence> {
    Materializer::new(repo, EngineConfig::default())
        .materialize_series(series_id, window)
        .await
        .expect("Failed to materialize series")
}

fn rename(title: &str) -> SeriesEdit {
    SeriesEdit {
        fields: PayloadPatch::title(title),
        rule: None,
    }
}

#[derive(Default)]
struct RecordingSink {
    keys: Mutex<Vec<CacheKey>>,
}

impl InvalidationSink for RecordingSink {
    fn invalidate(&self, keys: &[CacheKey]) {
        self.keys.lock().unwrap().extend_from_slice(keys);
    }
}

#[tokio::test]
async fn test_create_and_reload_series() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;

    let rule = RecurrenceRule::new(Frequency::Weekly)
        .interval(2)
        .on([chrono::Weekday::Mon, chrono::Weekday::Wed])
        .count(6);
    let created = create_weekly(&repo, "Standup", rule).await;

    let loaded = repo.load_template(created.id).await.unwrap();
    assert_eq!(loaded.rule, rule);
    assert_eq!(loaded.fields.title, "Standup");
    assert_eq!(loaded.recurrence_start, jan(1));
    assert_eq!(loaded.updated_at, created.updated_at);

    let listed = repo.list_templates(Uuid::nil()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(repo.list_templates(Uuid::now_v7()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_rejects_invalid_rule() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let result = SeriesEditor::new(&repo)
        .create_series(NewSeriesData {
            company_id: Uuid::nil(),
            anchor_start: jan(1),
            timezone: "UTC".to_string(),
            rule: RecurrenceRule::new(Frequency::Daily).count(0),
            recurrence_start: None,
            fields: TemplatePayload::titled("Broken"),
        })
        .await;

    assert!(matches!(result, Err(CoreError::InvalidRule(_))));
    assert!(repo.list_templates(Uuid::nil()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_override_precedence_survives_series_edit() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    editor
        .edit(series.id, EditScope::Single, jan(15), rename("X"))
        .await
        .unwrap();
    editor
        .edit(series.id, EditScope::Series, jan(1), rename("Daily sync"))
        .await
        .unwrap();

    let occurrences = materialize(&repo, series.id, january()).await;
    assert_eq!(occurrences.len(), 4);

    let overridden: Vec<_> = occurrences.iter().filter(|o| o.scheduled_at == jan(15)).collect();
    assert_eq!(overridden.len(), 1);
    assert_eq!(overridden[0].fields.title, "X");
    assert!(overridden[0].is_override());

    for occurrence in occurrences.iter().filter(|o| o.scheduled_at != jan(15)) {
        assert_eq!(occurrence.fields.title, "Daily sync");
        assert_eq!(occurrence.kind, OccurrenceKind::Base);
    }
}

#[tokio::test]
async fn test_exception_suppresses_occurrence() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    editor
        .edit(series.id, EditScope::Single, jan(8), rename("Moved"))
        .await
        .unwrap();
    editor.cancel(series.id, EditScope::Single, jan(8)).await.unwrap();

    let occurrences = materialize(&repo, series.id, january()).await;
    let instants: Vec<_> = occurrences.iter().map(|o| o.scheduled_at).collect();
    assert_eq!(instants, vec![jan(1), jan(15), jan(22)]);

    // The exception replaced the override rather than coexisting with it
    assert!(repo.find_override(series.id, jan(8)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_occurrence() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    editor.cancel(series.id, EditScope::Single, jan(8)).await.unwrap();
    editor.restore_occurrence(series.id, jan(8)).await.unwrap();

    let occurrences = materialize(&repo, series.id, january()).await;
    assert_eq!(occurrences.len(), 4);
    assert!(occurrences.iter().all(|o| o.fields.title == "Standup"));
}

#[tokio::test]
async fn test_single_edit_is_idempotent() {
    let (repo, pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    editor
        .edit(series.id, EditScope::Single, jan(8), rename("X"))
        .await
        .unwrap();
    let first = repo.find_override(series.id, jan(8)).await.unwrap();

    editor
        .edit(series.id, EditScope::Single, jan(8), rename("X"))
        .await
        .unwrap();
    let second = repo.find_override(series.id, jan(8)).await.unwrap();

    assert_eq!(first, second);

    let (rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM occurrence_overrides WHERE series_id = $1")
            .bind(series.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_edit_rejects_unknown_occurrence() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    let tuesday = jan(9);
    let result = editor
        .edit(series.id, EditScope::Single, tuesday, rename("Orphan"))
        .await;
    assert!(matches!(
        result,
        Err(CoreError::OccurrenceNotFound { occurrence_at, .. }) if occurrence_at == tuesday
    ));
    assert!(repo.find_override(series.id, tuesday).await.unwrap().is_none());

    let result = editor.cancel(Uuid::now_v7(), EditScope::Single, jan(8)).await;
    assert!(matches!(result, Err(CoreError::SeriesNotFound(_))));
}

#[tokio::test]
async fn test_split_correctness() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    editor
        .edit(series.id, EditScope::Single, jan(22), rename("Retro"))
        .await
        .unwrap();

    let outcome = editor
        .edit(series.id, EditScope::Future, jan(15), rename("Y"))
        .await
        .unwrap();
    let tail_id = outcome.new_series_id.expect("split creates a series");
    assert_ne!(tail_id, series.id);

    let mut occurrences = materialize(&repo, series.id, january()).await;
    occurrences.extend(materialize(&repo, tail_id, january()).await);

    let summary: Vec<_> = occurrences
        .iter()
        .map(|o| (o.scheduled_at, o.series_id, o.fields.title.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (jan(1), series.id, "Standup"),
            (jan(8), series.id, "Standup"),
            (jan(15), tail_id, "Y"),
            (jan(22), tail_id, "Retro"),
        ]
    );

    // The override moved with its occurrence
    assert!(repo.find_override(series.id, jan(22)).await.unwrap().is_none());
    assert!(repo.find_override(tail_id, jan(22)).await.unwrap().is_some());

    // Agenda view sees no duplicates on the boundary
    let agenda = Materializer::new(&repo, EngineConfig::default())
        .materialize_company(Uuid::nil(), january())
        .await
        .unwrap();
    assert!(agenda.is_complete());
    assert_eq!(agenda.occurrences.len(), 4);
}

#[tokio::test]
async fn test_split_count_bound_series() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series =
        create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly).count(5)).await;

    let outcome = SeriesEditor::new(&repo)
        .edit(series.id, EditScope::Future, jan(15), rename("Y"))
        .await
        .unwrap();
    let tail_id = outcome.new_series_id.unwrap();

    let wide = Window::new(jan(1), jan(1) + Duration::days(120)).unwrap();
    let head = materialize(&repo, series.id, wide).await;
    let tail = materialize(&repo, tail_id, wide).await;

    assert_eq!(head.len(), 2);
    assert_eq!(tail.len(), 3);
    assert_eq!(tail.last().unwrap().scheduled_at, jan(29));

    let truncated = repo.load_template(series.id).await.unwrap();
    assert_eq!(truncated.rule.termination, Termination::Count(2));
}

#[tokio::test]
async fn test_future_edit_on_first_occurrence_edits_series() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;

    let outcome = SeriesEditor::new(&repo)
        .edit(series.id, EditScope::Future, jan(1), rename("Y"))
        .await
        .unwrap();

    assert_eq!(outcome.new_series_id, None);
    assert_eq!(repo.list_templates(Uuid::nil()).await.unwrap().len(), 1);
    assert_eq!(repo.load_template(series.id).await.unwrap().fields.title, "Y");
}

#[tokio::test]
async fn test_stale_split_is_rejected_atomically() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    editor
        .edit(series.id, EditScope::Single, jan(22), rename("Retro"))
        .await
        .unwrap();

    // Someone else edits the series after we read it
    editor
        .edit(series.id, EditScope::Series, jan(1), rename("Renamed"))
        .await
        .unwrap();

    let mut truncated = series.clone();
    truncated.rule = truncated.rule.until(jan(15) - Duration::seconds(1));
    truncated.updated_at = Utc::now();
    let tail = SeriesTemplate {
        id: Uuid::now_v7(),
        anchor_start: jan(15),
        recurrence_start: jan(15),
        ..series.clone()
    };
    let tail_id = tail.id;

    let result = repo
        .split_series(SeriesSplit {
            truncated,
            expected_updated_at: series.updated_at,
            tail,
            boundary: jan(15),
        })
        .await;

    assert!(matches!(result, Err(CoreError::SplitIncomplete { .. })));
    assert!(repo.find_template(tail_id).await.unwrap().is_none());
    assert!(repo.find_override(series.id, jan(22)).await.unwrap().is_some());
    assert_eq!(materialize(&repo, series.id, january()).await.len(), 4);
}

#[tokio::test]
async fn test_cancel_future_truncates_and_series_deletes() {
    let (repo, pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let editor = SeriesEditor::new(&repo);

    editor
        .edit(series.id, EditScope::Single, jan(22), rename("Retro"))
        .await
        .unwrap();
    editor.cancel(series.id, EditScope::Single, jan(8)).await.unwrap();

    editor.cancel(series.id, EditScope::Future, jan(15)).await.unwrap();
    let occurrences = materialize(&repo, series.id, january()).await;
    let instants: Vec<_> = occurrences.iter().map(|o| o.scheduled_at).collect();
    assert_eq!(instants, vec![jan(1)]);
    assert!(repo.find_override(series.id, jan(22)).await.unwrap().is_none());

    let outcome = editor.cancel(series.id, EditScope::Series, jan(1)).await.unwrap();
    assert!(outcome.deleted);
    assert!(repo.find_template(series.id).await.unwrap().is_none());

    let (left,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM occurrence_exceptions WHERE series_id = $1")
            .bind(series.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn test_agenda_isolates_failing_series() {
    let (repo, pool, _temp_dir) = setup_test_db().await;
    let healthy = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let broken = create_weekly(&repo, "Review", RecurrenceRule::new(Frequency::Weekly)).await;

    sqlx::query("UPDATE series_templates SET rrule = 'FREQ=HOURLY' WHERE id = $1")
        .bind(broken.id)
        .execute(&pool)
        .await
        .unwrap();

    let agenda = Materializer::new(&repo, EngineConfig::default())
        .materialize_company(Uuid::nil(), january())
        .await
        .unwrap();

    assert_eq!(agenda.failures.len(), 1);
    assert_eq!(agenda.failures[0].series_id, broken.id);
    assert!(matches!(agenda.failures[0].error, CoreError::InvalidRule(_)));
    assert_eq!(agenda.occurrences.len(), 4);
    assert!(agenda.occurrences.iter().all(|o| o.series_id == healthy.id));
}

#[tokio::test]
async fn test_mutations_declare_cache_keys() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let series = create_weekly(&repo, "Standup", RecurrenceRule::new(Frequency::Weekly)).await;
    let sink = RecordingSink::default();
    let editor = SeriesEditor::new(&repo).with_sink(&sink);

    editor
        .edit(series.id, EditScope::Single, jan(8), rename("X"))
        .await
        .unwrap();
    let split = editor
        .edit(series.id, EditScope::Future, jan(15), rename("Y"))
        .await
        .unwrap();
    let tail_id = split.new_series_id.unwrap();

    let keys = sink.keys.lock().unwrap().clone();
    assert_eq!(
        keys,
        vec![
            CacheKey::instant(series.id, jan(8)),
            CacheKey::starting_at(series.id, jan(15)),
            CacheKey::all(tail_id),
        ]
    );

    // A view of the first week stays valid after the split
    let first_week = Window::new(jan(1), jan(8)).unwrap();
    assert!(!keys.iter().any(|key| key.affects(series.id, &first_week)));
}

#[tokio::test]
async fn test_wall_clock_series_across_dst() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let tz = chrono_tz::America::New_York;
    let anchor = tz.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

    let series = SeriesEditor::new(&repo)
        .create_series(NewSeriesData {
            company_id: Uuid::nil(),
            anchor_start: anchor.with_timezone(&Utc),
            timezone: "America/New_York".to_string(),
            rule: RecurrenceRule::new(Frequency::Weekly).count(2),
            recurrence_start: None,
            fields: TemplatePayload::titled("Standup"),
        })
        .await
        .unwrap();

    let window = Window::new(anchor.with_timezone(&Utc), anchor.with_timezone(&Utc) + Duration::days(30)).unwrap();
    let occurrences = materialize(&repo, series.id, window).await;
    assert_eq!(
        occurrences.iter().map(|o| o.scheduled_at).collect::<Vec<_>>(),
        vec![
            Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 11, 13, 0, 0).unwrap(),
        ]
    );
}

#[tokio::test]
async fn test_subsecond_anchor_is_an_occurrence() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let editor = SeriesEditor::new(&repo);
    let anchor = jan(1) + Duration::milliseconds(500);

    let series = editor
        .create_series(NewSeriesData {
            company_id: Uuid::nil(),
            anchor_start: anchor,
            timezone: "UTC".to_string(),
            rule: RecurrenceRule::new(Frequency::Daily).count(3),
            recurrence_start: None,
            fields: TemplatePayload::titled("Standup"),
        })
        .await
        .unwrap();
    assert_eq!(series.anchor_start, jan(1));
    assert_eq!(series.recurrence_start, jan(1));

    let instants: Vec<_> = materialize(&repo, series.id, january())
        .await
        .iter()
        .map(|o| o.scheduled_at)
        .collect();
    assert_eq!(instants, vec![jan(1), jan(2), jan(3)]);

    editor
        .cancel(series.id, EditScope::Single, anchor)
        .await
        .expect("the anchor is an occurrence");
    let instants: Vec<_> = materialize(&repo, series.id, january())
        .await
        .iter()
        .map(|o| o.scheduled_at)
        .collect();
    assert_eq!(instants, vec![jan(2), jan(3)]);
}

async fn agenda_instants(repo: &SqliteRepository) -> Vec<DateTime<Utc>> {
    let agenda = Materializer::new(repo, EngineConfig::default())
        .materialize_company(Uuid::nil(), january())
        .await
        .unwrap();
    assert!(agenda.is_complete());
    agenda.occurrences.iter().map(|o| o.scheduled_at).collect()
}

#[tokio::test]
async fn test_series_rule_edit_after_split_stays_bounded() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let editor = SeriesEditor::new(&repo);
    let series = create_weekly(&repo, "Old", RecurrenceRule::new(Frequency::Weekly)).await;

    editor
        .edit(series.id, EditScope::Future, jan(15), rename("Y"))
        .await
        .unwrap();
    editor
        .edit(
            series.id,
            EditScope::Series,
            jan(1),
            SeriesEdit {
                fields: PayloadPatch::default(),
                rule: Some(RecurrenceRule::new(Frequency::Weekly).on([chrono::Weekday::Mon])),
            },
        )
        .await
        .unwrap();

    let original: Vec<_> = materialize(&repo, series.id, january())
        .await
        .iter()
        .map(|o| o.scheduled_at)
        .collect();
    assert_eq!(original, vec![jan(1), jan(8)]);
    assert_eq!(agenda_instants(&repo).await, vec![jan(1), jan(8), jan(15), jan(22)]);
}

#[tokio::test]
async fn test_future_rule_edit_keeps_earlier_split_bound() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let editor = SeriesEditor::new(&repo);
    let series = create_weekly(&repo, "Old", RecurrenceRule::new(Frequency::Weekly)).await;

    editor
        .edit(series.id, EditScope::Future, jan(22), rename("Late"))
        .await
        .unwrap();
    let outcome = editor
        .edit(
            series.id,
            EditScope::Future,
            jan(8),
            SeriesEdit {
                fields: PayloadPatch::title("Middle"),
                rule: Some(RecurrenceRule::new(Frequency::Weekly)),
            },
        )
        .await
        .unwrap();

    let middle = repo
        .load_template(outcome.new_series_id.unwrap())
        .await
        .unwrap();
    assert_eq!(middle.recurrence_end, Some(jan(22) - Duration::seconds(1)));
    assert_eq!(agenda_instants(&repo).await, vec![jan(1), jan(8), jan(15), jan(22)]);
}
