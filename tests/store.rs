use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{Duration, Utc};

use taskflow::{
    CategoryDraft, CyclingColorPicker, Priority, SqliteGateway, StatusFilter, StoreConfig,
    StoreError, TaskDraft, TaskEvent, TaskStore,
};

fn open_store() -> Result<TaskStore> {
    Ok(TaskStore::new(SqliteGateway::open_in_memory()?)?)
}

fn recording_subscriber(
    log: &Arc<Mutex<Vec<String>>>,
) -> impl Fn(&TaskEvent) + Send + 'static {
    let log = Arc::clone(log);
    move |event| {
        log.lock()
            .expect("event log lock should not be poisoned")
            .push(format!("{}:{}", event.kind(), event.task().id));
    }
}

fn events(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock()
        .expect("event log lock should not be poisoned")
        .clone()
}

#[tokio::test]
async fn insert_assigns_unique_ids_and_appears_in_all_view() -> Result<()> {
    let store = open_store()?;

    let first = store
        .insert(
            TaskDraft::new("Pay rent")
                .priority(Priority::High)
                .due(Utc::now() + Duration::days(1)),
        )
        .await?;
    let second = store.insert(TaskDraft::new("Water plants")).await?;

    assert_ne!(first, 0);
    assert_ne!(second, 0);
    assert_ne!(first, second);

    let all = store.all_view(StatusFilter::All).snapshot();
    let rent: Vec<_> = all.iter().filter(|p| p.task.title == "Pay rent").collect();
    assert_eq!(rent.len(), 1);
    assert_eq!(rent[0].task.id, first);
    assert_eq!(rent[0].task.priority, Priority::High);
    Ok(())
}

#[tokio::test]
async fn insert_applies_draft_defaults() -> Result<()> {
    let store = open_store()?;

    let id = store.insert(TaskDraft::new("Defaults")).await?;
    let task = store.task(id).await?.expect("task should exist");

    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.kind, "regular");
    assert!(!task.completed);
    Ok(())
}

#[tokio::test]
async fn insert_empty_title_fails_without_side_effects() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));
    store.subscribe(recording_subscriber(&log));

    let result = store.insert(TaskDraft::new("   ")).await;

    assert!(matches!(result, Err(StoreError::Validation(_))));
    assert!(store.tasks_snapshot().is_empty());
    assert!(store.all_view(StatusFilter::All).snapshot().is_empty());
    assert!(events(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn insert_with_dangling_category_reference_fails_cleanly() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));
    store.subscribe(recording_subscriber(&log));

    let result = store.insert(TaskDraft::new("Ghost category").category(99)).await;

    assert!(matches!(result, Err(StoreError::Validation(_))));
    assert!(store.tasks_snapshot().is_empty());
    assert!(events(&log).is_empty());
    Ok(())
}

#[tokio::test]
async fn update_requires_assigned_identifier() -> Result<()> {
    let store = open_store()?;

    let id = store.insert(TaskDraft::new("Saved")).await?;
    let mut task = store.task(id).await?.expect("task should exist");

    task.id = 0;
    let result = store.update(&task).await;
    assert!(matches!(result, Err(StoreError::InvalidState(_))));

    task.id = id;
    task.title = "Saved and renamed".to_string();
    store.update(&task).await?;

    let fetched = store.task(id).await?.expect("task should exist");
    assert_eq!(fetched.title, "Saved and renamed");
    Ok(())
}

#[tokio::test]
async fn overdue_count_tracks_completion_and_is_idempotent() -> Result<()> {
    let store = open_store()?;

    let overdue_id = store
        .insert(TaskDraft::new("Late").due(Utc::now() - Duration::hours(2)))
        .await?;
    store
        .insert(TaskDraft::new("On time").due(Utc::now() + Duration::days(1)))
        .await?;

    let overdue = store.overdue_count();
    assert_eq!(overdue.get(), 1);

    let task = store.task(overdue_id).await?.expect("task should exist");
    store.complete(&task).await?;
    assert_eq!(overdue.get(), 0);

    // Completing again yields the same observable state.
    store.complete(&task).await?;
    assert_eq!(overdue.get(), 0);
    let completed = store.completed_view().snapshot();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].task.id, overdue_id);
    Ok(())
}

#[tokio::test]
async fn upcoming_count_covers_next_24_hours() -> Result<()> {
    let store = open_store()?;

    store
        .insert(TaskDraft::new("Soon").due(Utc::now() + Duration::hours(3)))
        .await?;
    store
        .insert(TaskDraft::new("Next week").due(Utc::now() + Duration::days(6)))
        .await?;
    store
        .insert(TaskDraft::new("Past").due(Utc::now() - Duration::hours(3)))
        .await?;

    assert_eq!(store.upcoming_count().get(), 1);
    assert_eq!(store.due_soon_count(Duration::days(7)).get(), 2);
    Ok(())
}

#[tokio::test]
async fn priority_ordering_yields_non_decreasing_ranks() -> Result<()> {
    let store = open_store()?;

    store
        .insert(TaskDraft::new("low").priority(Priority::Low))
        .await?;
    store
        .insert(TaskDraft::new("high").priority(Priority::High))
        .await?;
    store
        .insert(TaskDraft::new("medium").priority(Priority::Medium))
        .await?;

    store.set_ordering("priority").await?;
    let ranks: Vec<i64> = store
        .all_view(StatusFilter::All)
        .snapshot()
        .iter()
        .map(|p| p.task.priority.rank())
        .collect();

    let mut sorted = ranks.clone();
    sorted.sort();
    assert_eq!(ranks, sorted);
    assert_eq!(ranks, vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn bogus_ordering_name_behaves_like_date() -> Result<()> {
    let store = open_store()?;

    store
        .insert(TaskDraft::new("second").due(Utc::now() + Duration::hours(2)))
        .await?;
    store
        .insert(TaskDraft::new("first").due(Utc::now() + Duration::hours(1)))
        .await?;
    store.insert(TaskDraft::new("undated")).await?;

    store.set_ordering("date").await?;
    let by_date: Vec<i64> = store
        .all_view(StatusFilter::All)
        .snapshot()
        .iter()
        .map(|p| p.task.id)
        .collect();

    store.set_ordering("bogus").await?;
    assert_eq!(store.ordering().name(), "date");
    let by_bogus: Vec<i64> = store
        .all_view(StatusFilter::All)
        .snapshot()
        .iter()
        .map(|p| p.task.id)
        .collect();

    assert_eq!(by_date, by_bogus);
    Ok(())
}

#[tokio::test]
async fn selection_survives_deletes_until_empty() -> Result<()> {
    let store = open_store()?;

    let t1 = store.insert(TaskDraft::new("T1")).await?;
    let t2 = store.insert(TaskDraft::new("T2")).await?;

    assert!(store.toggle_selection(t1).await?);
    assert!(store.toggle_selection(t2).await?);

    let task1 = store.task(t1).await?.expect("task should exist");
    store.delete(&task1).await?;

    let selected = store.selection().get();
    assert_eq!(selected.iter().copied().collect::<Vec<_>>(), vec![t2]);
    assert!(store.selection_active().get());
    assert!(!store.is_selected(t1));
    assert!(store.is_selected(t2));

    let task2 = store.task(t2).await?.expect("task should exist");
    store.delete(&task2).await?;

    assert!(store.selection().get().is_empty());
    assert!(!store.selection_active().get());
    Ok(())
}

#[tokio::test]
async fn selection_toggle_is_involution_and_ignores_unknown_ids() -> Result<()> {
    let store = open_store()?;
    let id = store.insert(TaskDraft::new("toggle me")).await?;

    assert!(store.toggle_selection(id).await?);
    assert!(!store.toggle_selection(id).await?);
    assert!(!store.is_selected(id));

    assert!(!store.toggle_selection(999).await?);
    assert!(store.selection().get().is_empty());
    Ok(())
}

#[tokio::test]
async fn clear_selection_empties_wholesale() -> Result<()> {
    let store = open_store()?;
    let t1 = store.insert(TaskDraft::new("a")).await?;
    let t2 = store.insert(TaskDraft::new("b")).await?;
    store.toggle_selection(t1).await?;
    store.toggle_selection(t2).await?;

    store.clear_selection().await?;

    assert!(store.selection().get().is_empty());
    assert!(!store.selection_active().get());
    Ok(())
}

#[tokio::test]
async fn category_with_no_dependents_deletes_directly() -> Result<()> {
    let store = open_store()?;

    let id = store.insert_category(CategoryDraft::new("Empty")).await?;
    let category = store
        .categories_view()
        .get()
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .expect("category should exist");

    assert!(store.can_delete_category(id).await?);
    store.delete_category(&category).await?;
    assert!(store.categories_view().get().iter().all(|c| c.id != id));
    Ok(())
}

#[tokio::test]
async fn category_deletion_with_dependents_requires_decision() -> Result<()> {
    let store = open_store()?;

    let cat_id = store.insert_category(CategoryDraft::new("Busy")).await?;
    store
        .insert(TaskDraft::new("dependent").category(cat_id))
        .await?;
    let category = store
        .categories_view()
        .get()
        .iter()
        .find(|c| c.id == cat_id)
        .cloned()
        .expect("category should exist");

    assert!(!store.can_delete_category(cat_id).await?);
    let result = store.delete_category(&category).await;
    assert!(matches!(
        result,
        Err(StoreError::DecisionRequired { dependents: 1 })
    ));

    // Nothing happened: the category and its dependent are untouched.
    assert!(store.categories_view().get().iter().any(|c| c.id == cat_id));
    assert_eq!(store.task_count_for_category(cat_id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn delete_category_keep_tasks_clears_references() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));

    let cat_id = store.insert_category(CategoryDraft::new("Chores")).await?;
    let mut task_ids = Vec::new();
    for title in ["sweep", "dust", "mop"] {
        task_ids.push(store.insert(TaskDraft::new(title).category(cat_id)).await?);
    }
    let category = store
        .categories_view()
        .get()
        .iter()
        .find(|c| c.id == cat_id)
        .cloned()
        .expect("category should exist");

    store.subscribe(recording_subscriber(&log));
    store.delete_category_keep_tasks(&category).await?;

    // All three tasks survive with the reference cleared, none deleted.
    let tasks = store.tasks_snapshot();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.category_id.is_none()));
    assert!(events(&log).iter().all(|e| !e.starts_with("deleted")));
    assert!(store.categories_view().get().iter().all(|c| c.id != cat_id));

    // The projection join resolves to no category as well.
    let all = store.all_view(StatusFilter::All).snapshot();
    assert!(all.iter().all(|p| p.category.is_none()));
    Ok(())
}

#[tokio::test]
async fn delete_category_and_tasks_fires_one_deletion_per_dependent() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));

    let cat_id = store.insert_category(CategoryDraft::new("Doomed")).await?;
    let mut task_ids = Vec::new();
    for title in ["one", "two"] {
        task_ids.push(store.insert(TaskDraft::new(title).category(cat_id)).await?);
    }
    let survivor = store.insert(TaskDraft::new("unrelated")).await?;
    store.toggle_selection(task_ids[0]).await?;
    let category = store
        .categories_view()
        .get()
        .iter()
        .find(|c| c.id == cat_id)
        .cloned()
        .expect("category should exist");

    store.subscribe(recording_subscriber(&log));
    store.delete_category_and_tasks(&category).await?;

    let deleted: Vec<String> = events(&log)
        .into_iter()
        .filter(|e| e.starts_with("deleted"))
        .collect();
    assert_eq!(deleted.len(), 2);
    for id in &task_ids {
        assert!(deleted.contains(&format!("deleted:{id}")));
    }

    let remaining = store.tasks_snapshot();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, survivor);
    assert!(store.selection().get().is_empty());
    assert!(store.categories_view().get().iter().all(|c| c.id != cat_id));
    Ok(())
}

#[tokio::test]
async fn delete_many_is_one_unit_with_per_entity_notifications() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));

    let a = store.insert(TaskDraft::new("a")).await?;
    let b = store.insert(TaskDraft::new("b")).await?;
    let c = store.insert(TaskDraft::new("c")).await?;
    store.toggle_selection(a).await?;
    store.toggle_selection(b).await?;

    store.subscribe(recording_subscriber(&log));
    let removed = store.delete_many(vec![a, b]).await?;

    assert_eq!(removed, 2);
    assert_eq!(
        events(&log),
        vec![format!("deleted:{a}"), format!("deleted:{b}")]
    );
    assert!(store.selection().get().is_empty());
    assert_eq!(store.tasks_snapshot().len(), 1);
    assert_eq!(store.tasks_snapshot()[0].id, c);
    Ok(())
}

#[tokio::test]
async fn toggle_completion_dispatches_asymmetric_events() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));

    let id = store.insert(TaskDraft::new("flip me")).await?;
    store.subscribe(recording_subscriber(&log));

    let task = store.task(id).await?.expect("task should exist");
    assert!(store.toggle_completion(&task).await?);

    let task = store.task(id).await?.expect("task should exist");
    assert!(task.completed);
    assert!(!store.toggle_completion(&task).await?);

    assert_eq!(
        events(&log),
        vec![format!("completed:{id}"), format!("updated:{id}")]
    );
    Ok(())
}

#[tokio::test]
async fn notifications_arrive_in_submission_order() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));
    store.subscribe(recording_subscriber(&log));

    // Submit without awaiting in between: the write path still executes
    // strictly in submission order.
    let first = store.insert(TaskDraft::new("first"));
    let second = store.insert(TaskDraft::new("second"));
    let third = store.insert(TaskDraft::new("third"));
    let first = first.await?;
    let second = second.await?;
    let third = third.await?;

    assert_eq!(
        events(&log),
        vec![
            format!("added:{first}"),
            format!("added:{second}"),
            format!("added:{third}"),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unsubscribe_stops_delivery() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));
    let subscription = store.subscribe(recording_subscriber(&log));

    store.insert(TaskDraft::new("heard")).await?;
    assert!(store.unsubscribe(subscription));
    store.insert(TaskDraft::new("unheard")).await?;

    assert_eq!(events(&log).len(), 1);
    Ok(())
}

#[tokio::test]
async fn panicking_subscriber_does_not_break_the_write_path() -> Result<()> {
    let store = open_store()?;
    let log = Arc::new(Mutex::new(Vec::new()));
    store.subscribe(|_event: &TaskEvent| panic!("subscriber bug"));
    store.subscribe(recording_subscriber(&log));

    let id = store.insert(TaskDraft::new("resilient")).await?;

    assert_eq!(events(&log), vec![format!("added:{id}")]);
    assert_eq!(store.tasks_snapshot().len(), 1);
    Ok(())
}

#[tokio::test]
async fn restore_preserves_identifier_for_undo() -> Result<()> {
    let store = open_store()?;

    let id = store
        .insert(TaskDraft::new("precious").priority(Priority::High))
        .await?;
    let task = store.task(id).await?.expect("task should exist");

    store.delete(&task).await?;
    assert!(store.task(id).await?.is_none());

    let restored = store.restore(&task).await?;
    assert_eq!(restored, id);

    let back = store.task(id).await?.expect("task should be restored");
    assert_eq!(back.title, "precious");
    assert_eq!(back.priority, Priority::High);
    Ok(())
}

#[tokio::test]
async fn pending_view_filters_the_joined_projection() -> Result<()> {
    let store = open_store()?;

    let cat_id = store.insert_category(CategoryDraft::new("Home")).await?;
    let pending_id = store
        .insert(TaskDraft::new("pending").category(cat_id))
        .await?;
    let done_id = store
        .insert(TaskDraft::new("done").category(cat_id).completed(true))
        .await?;

    let pending = store.pending_view().snapshot();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task.id, pending_id);
    assert_eq!(
        pending[0].category.as_ref().map(|c| c.name.as_str()),
        Some("Home")
    );

    let completed = store.completed_view().snapshot();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].task.id, done_id);
    Ok(())
}

#[tokio::test]
async fn view_changed_wakes_on_mutation() -> Result<()> {
    let store = open_store()?;
    let mut view = store.all_view(StatusFilter::All);

    let ticket = store.insert(TaskDraft::new("wake up"));
    assert!(view.changed().await);
    assert_eq!(view.snapshot().len(), 1);
    ticket.await?;
    Ok(())
}

#[tokio::test]
async fn configured_store_applies_ordering_filter_and_palette() -> Result<()> {
    let config = StoreConfig {
        ordering: "priority".to_string(),
        filter: "pending".to_string(),
    };
    let store = TaskStore::with_options(
        SqliteGateway::open_in_memory()?,
        config,
        Box::new(CyclingColorPicker::default()),
    )?;

    assert_eq!(store.ordering().name(), "priority");
    assert_eq!(store.default_view().filter(), StatusFilter::Pending);

    let first = store.insert_category(CategoryDraft::new("First")).await?;
    let second = store.insert_category(CategoryDraft::new("Second")).await?;
    let explicit = store
        .insert_category(CategoryDraft::new("Explicit").color("purple"))
        .await?;

    let categories = store.categories_view().get();
    let color_of = |id: i64| {
        categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.color.clone())
            .expect("category should exist")
    };
    assert_eq!(color_of(first), "red");
    assert_eq!(color_of(second), "green");
    assert_eq!(color_of(explicit), "purple");
    Ok(())
}

#[tokio::test]
async fn category_insert_rejects_empty_name() -> Result<()> {
    let store = open_store()?;

    let result = store.insert_category(CategoryDraft::new("  ")).await;
    assert!(matches!(result, Err(StoreError::Validation(_))));
    assert!(store.categories_view().get().is_empty());
    Ok(())
}

#[tokio::test]
async fn refresh_replaces_the_mirror_from_the_gateway() -> Result<()> {
    let store = open_store()?;

    let id = store.insert(TaskDraft::new("persisted")).await?;
    store.refresh().await?;

    let mirror = store.tasks_snapshot();
    assert_eq!(mirror.len(), 1);
    assert_eq!(mirror[0].id, id);
    Ok(())
}

#[tokio::test]
async fn file_backed_store_reloads_persisted_tasks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("taskflow.sqlite");

    let id = {
        let store = TaskStore::new(SqliteGateway::open(&db_path)?)?;
        store
            .insert(TaskDraft::new("durable").priority(Priority::Low))
            .await?
    };

    let store = TaskStore::new(SqliteGateway::open(&db_path)?)?;
    let task = store.task(id).await?.expect("task should have persisted");
    assert_eq!(task.title, "durable");
    assert_eq!(task.priority, Priority::Low);
    assert_eq!(store.tasks_snapshot().len(), 1);
    Ok(())
}

#[tokio::test]
async fn pay_rent_scenario() -> Result<()> {
    let store = open_store()?;

    let id = store
        .insert(
            TaskDraft::new("Pay rent")
                .due(Utc::now() + Duration::days(1))
                .priority(Priority::High),
        )
        .await?;
    assert_eq!(id, 1);

    let pending = store.pending_view().snapshot();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task.title, "Pay rent");
    assert!(pending[0].category.is_none());

    let overdue_before = store.overdue_count().get();
    let task = store.task(id).await?.expect("task should exist");
    store.complete(&task).await?;

    assert!(store.pending_view().snapshot().is_empty());
    let completed = store.completed_view().snapshot();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].task.id, id);
    assert_eq!(store.overdue_count().get(), overdue_before);
    Ok(())
}
