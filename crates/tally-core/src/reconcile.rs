//! Clearing completions that a reset boundary has made stale.
//!
//! [`reconcile_tasks`] is the pure core. [`Reconciler`] applies it to a
//! [`LocalRepository`] and [`Reconciler::spawn`] runs it on a timer, also
//! reloading whenever another writer touches the shared backend.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::models::{ReconcilerConfig, StoredInstant, Task};
use crate::repository::LocalRepository;
use crate::reset::ResetSchedule;
use crate::storage::StorageKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Stale,
    /// Stale because the governing timestamp could not be read.
    StaleMalformed,
}

impl Staleness {
    pub fn is_stale(self) -> bool {
        !matches!(self, Staleness::Fresh)
    }
}

/// Decides whether a task's completion belongs to a period that has ended.
///
/// Only completed tasks can be stale. The completion stamp governs; tasks
/// without one fall back to their due date, and tasks with neither are
/// stale. A stamp exactly at the boundary belongs to the current period.
pub fn staleness(task: &Task, now: DateTime<Utc>, schedule: &ResetSchedule) -> Staleness {
    if !task.completed {
        return Staleness::Fresh;
    }
    let boundary = schedule.most_recent_boundary(now, task.frequency);
    match task.last_completed_at.as_ref().or(task.due_date.as_ref()) {
        None => Staleness::Stale,
        Some(StoredInstant::Malformed(_)) => Staleness::StaleMalformed,
        Some(StoredInstant::Valid(at)) if *at < boundary => Staleness::Stale,
        Some(StoredInstant::Valid(_)) => Staleness::Fresh,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub examined: usize,
    /// Ids of tasks whose completion was cleared
    pub cleared: Vec<String>,
    pub malformed: usize,
    /// Tasks whose character is not in the roster. Counted, never removed.
    pub orphaned: usize,
}

impl ReconcileSummary {
    pub fn changed(&self) -> bool {
        !self.cleared.is_empty()
    }
}

/// Clears every stale completion in `tasks`.
pub fn reconcile_tasks(tasks: &mut [Task], now: DateTime<Utc>, schedule: &ResetSchedule) -> ReconcileSummary {
    let mut summary = ReconcileSummary {
        examined: tasks.len(),
        ..Default::default()
    };

    for task in tasks.iter_mut() {
        match staleness(task, now, schedule) {
            Staleness::Fresh => continue,
            Staleness::StaleMalformed => {
                warn!(id = %task.id, "unreadable completion timestamp; clearing completion");
                summary.malformed += 1;
            }
            Staleness::Stale => {}
        }
        task.completed = false;
        summary.cleared.push(task.id.clone());
    }

    summary
}

pub struct Reconciler {
    repo: Arc<LocalRepository>,
    clock: Arc<dyn Clock>,
    schedule: ResetSchedule,
}

impl Reconciler {
    pub fn new(repo: Arc<LocalRepository>, clock: Arc<dyn Clock>, schedule: ResetSchedule) -> Self {
        Self { repo, clock, schedule }
    }

    pub async fn tick(&self) -> ReconcileSummary {
        self.tick_at(self.clock.now()).await
    }

    /// Reconciles the repository as of `now`. Writes only when a task
    /// changed, and retries writes that failed earlier. Never fails.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> ReconcileSummary {
        let mut state = self.repo.lock().await;
        let mut summary = reconcile_tasks(&mut state.tasks, now, &self.schedule);

        let roster: HashSet<&str> = state.characters.iter().map(|c| c.name.as_str()).collect();
        summary.orphaned = state
            .tasks
            .iter()
            .filter(|t| !roster.contains(t.character.as_str()))
            .count();

        // A dirty task key is written by the retry below.
        if summary.changed() && !state.dirty.contains(&StorageKey::Tasks) {
            self.repo.commit(&mut state, &[StorageKey::Tasks]).await;
        } else if summary.changed() {
            debug!("task write already pending");
        }
        if !state.dirty.is_empty() {
            if let Err(e) = self.repo.retry_pending(&mut state).await {
                debug!(error = %e, "writes still pending after retry");
            }
        }

        debug!(
            examined = summary.examined,
            cleared = summary.cleared.len(),
            orphaned = summary.orphaned,
            "reconcile tick"
        );
        summary
    }

    /// Runs one tick immediately, then one per `config.interval`, plus one
    /// after every reload triggered by another writer.
    pub fn spawn(repo: Arc<LocalRepository>, clock: Arc<dyn Clock>, config: ReconcilerConfig) -> ReconcilerHandle {
        let reconciler = Reconciler::new(repo, clock, config.schedule);
        let (summaries_tx, summaries_rx) = watch::channel(ReconcileSummary::default());
        let mut changes = reconciler.repo.external_changes();
        // A zero period would make the interval panic.
        let period = config.interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut listening = true;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    change = changes.next(), if listening => match change {
                        Some(change) => {
                            reconciler.repo.apply_external(change).await;
                        }
                        None => {
                            listening = false;
                            continue;
                        }
                    },
                }
                let summary = reconciler.tick().await;
                let _ = summaries_tx.send(summary);
            }
        });

        ReconcilerHandle {
            task,
            summaries: summaries_rx,
        }
    }
}

/// Owns the background reconciler. Dropping it stops the loop.
pub struct ReconcilerHandle {
    task: JoinHandle<()>,
    summaries: watch::Receiver<ReconcileSummary>,
}

impl ReconcilerHandle {
    /// Receiver updated after every tick.
    pub fn summaries(&self) -> watch::Receiver<ReconcileSummary> {
        self.summaries.clone()
    }

    pub fn latest(&self) -> ReconcileSummary {
        self.summaries.borrow().clone()
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Frequency, NewCharacterData, NewTaskData};
    use crate::repository::{CharacterRepository, TaskRepository};
    use crate::storage::{MemoryStorage, StorageBackend};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rstest::rstest;
    use tokio::sync::broadcast::error::TryRecvError;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn completed(frequency: Frequency, stamp: Option<StoredInstant>) -> Task {
        Task {
            id: "t".to_string(),
            character: "Aria".to_string(),
            name: "task".to_string(),
            frequency,
            completed: true,
            category: String::new(),
            due_date: None,
            last_completed_at: stamp,
            priority: None,
            note: None,
            created_at: StoredInstant::Valid(at(2024, 1, 1, 0, 0)),
        }
    }

    #[rstest]
    // Daily, same day
    #[case(Frequency::Daily, at(2024, 3, 6, 10, 0), at(2024, 3, 6, 11, 0), Staleness::Fresh)]
    // Daily, next day
    #[case(Frequency::Daily, at(2024, 3, 6, 10, 0), at(2024, 3, 7, 10, 0), Staleness::Stale)]
    // Completed exactly at the boundary
    #[case(Frequency::Daily, at(2024, 3, 7, 0, 0), at(2024, 3, 7, 8, 0), Staleness::Fresh)]
    // Weekly, Tuesday night to Wednesday midnight
    #[case(Frequency::Weekly, at(2024, 3, 5, 23, 0), at(2024, 3, 6, 0, 0), Staleness::Stale)]
    // Weekly, Wednesday to the following Tuesday
    #[case(Frequency::Weekly, at(2024, 3, 6, 1, 0), at(2024, 3, 12, 23, 59), Staleness::Fresh)]
    // Monthly across the first
    #[case(Frequency::Monthly, at(2024, 2, 29, 12, 0), at(2024, 3, 1, 0, 1), Staleness::Stale)]
    #[case(Frequency::Monthly, at(2024, 3, 1, 12, 0), at(2024, 3, 31, 23, 0), Staleness::Fresh)]
    fn test_staleness(
        #[case] frequency: Frequency,
        #[case] done: DateTime<Utc>,
        #[case] now: DateTime<Utc>,
        #[case] expected: Staleness,
    ) {
        let task = completed(frequency, Some(StoredInstant::Valid(done)));
        assert_eq!(staleness(&task, now, &ResetSchedule::default()), expected);
    }

    #[test]
    fn test_staleness_fallbacks() {
        let schedule = ResetSchedule::default();
        let now = at(2024, 3, 6, 12, 0);

        let mut task = completed(Frequency::Daily, None);
        assert_eq!(staleness(&task, now, &schedule), Staleness::Stale);

        task.due_date = Some(StoredInstant::Valid(at(2024, 3, 6, 9, 0)));
        assert_eq!(staleness(&task, now, &schedule), Staleness::Fresh);

        task.last_completed_at = Some(StoredInstant::Malformed("yesterday".to_string()));
        assert_eq!(staleness(&task, now, &schedule), Staleness::StaleMalformed);

        task.completed = false;
        assert_eq!(staleness(&task, now, &schedule), Staleness::Fresh);
    }

    #[test]
    fn test_reconcile_tasks_summary() {
        let mut tasks = vec![
            completed(Frequency::Daily, Some(StoredInstant::Valid(at(2024, 3, 5, 10, 0)))),
            completed(Frequency::Weekly, Some(StoredInstant::Valid(at(2024, 3, 6, 10, 0)))),
            completed(Frequency::Daily, Some(StoredInstant::Malformed("??".to_string()))),
        ];
        tasks[1].id = "weekly".to_string();
        tasks[2].id = "broken".to_string();

        let summary = reconcile_tasks(&mut tasks, at(2024, 3, 6, 12, 0), &ResetSchedule::default());
        assert_eq!(summary.examined, 3);
        assert_eq!(summary.cleared, vec!["t".to_string(), "broken".to_string()]);
        assert_eq!(summary.malformed, 1);
        assert!(!tasks[0].completed);
        assert!(tasks[1].completed);
        assert!(!tasks[2].completed);
    }

    async fn setup(start: DateTime<Utc>) -> (Arc<MemoryStorage>, Arc<LocalRepository>, ManualClock, String) {
        let storage = Arc::new(MemoryStorage::new());
        let repo = Arc::new(LocalRepository::open(storage.clone()).await);
        repo.add_character(NewCharacterData {
            name: "Aria".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        let task = repo.add_task(NewTaskData::new("Aria", "Farm", Frequency::Daily)).await.unwrap();
        repo.set_completed(&task.id, true, start).await.unwrap();
        (storage, repo, ManualClock::new(start), task.id)
    }

    #[tokio::test]
    async fn test_tick_clears_after_a_day_only() {
        let start = at(2024, 3, 6, 10, 0);
        let (_, repo, clock, id) = setup(start).await;
        let reconciler = Reconciler::new(repo.clone(), Arc::new(clock.clone()), ResetSchedule::default());

        clock.advance(ChronoDuration::hours(1));
        let summary = reconciler.tick().await;
        assert!(!summary.changed());
        assert!(repo.find_task(&id).await.unwrap().completed);

        clock.advance(ChronoDuration::hours(23));
        let summary = reconciler.tick().await;
        assert_eq!(summary.cleared, vec![id.clone()]);
        assert!(!repo.find_task(&id).await.unwrap().completed);
    }

    #[tokio::test]
    async fn test_tick_writes_only_on_change() {
        let start = at(2024, 3, 6, 10, 0);
        let (storage, repo, clock, _) = setup(start).await;
        let reconciler = Reconciler::new(repo, Arc::new(clock.clone()), ResetSchedule::default());
        let mut events = storage.subscribe();

        reconciler.tick().await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        clock.advance(ChronoDuration::days(1));
        reconciler.tick().await;
        assert_eq!(events.try_recv().unwrap().key, StorageKey::Tasks);
    }

    #[tokio::test]
    async fn test_tick_counts_orphans_without_removing() {
        let start = at(2024, 3, 6, 10, 0);
        let (_, repo, clock, _) = setup(start).await;
        repo.add_task(NewTaskData::new("Ghost", "Haunt", Frequency::Weekly)).await.unwrap();
        let reconciler = Reconciler::new(repo.clone(), Arc::new(clock), ResetSchedule::default());

        let summary = reconciler.tick().await;
        assert_eq!(summary.orphaned, 1);
        assert_eq!(repo.tasks().await.len(), 2);
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_spawned_reconciler_clears_and_stops() {
        let start = at(2024, 3, 6, 10, 0);
        let (_, repo, clock, id) = setup(start).await;
        let config = ReconcilerConfig {
            interval: Duration::from_millis(10),
            ..Default::default()
        };
        let handle = Reconciler::spawn(repo.clone(), Arc::new(clock.clone()), config);

        clock.advance(ChronoDuration::days(1));
        wait_until(|| {
            let repo = repo.clone();
            let id = id.clone();
            async move { !repo.find_task(&id).await.unwrap().completed }
        })
        .await;
        assert_eq!(handle.latest().examined, 1);

        handle.shutdown();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_spawned_reconciler_reloads_external_writes() {
        let start = at(2024, 3, 6, 10, 0);
        let (storage, repo, clock, _) = setup(start).await;
        let config = ReconcilerConfig {
            interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let _handle = Reconciler::spawn(repo.clone(), Arc::new(clock), config);

        let other_tab = LocalRepository::open(storage).await;
        other_tab
            .add_task(NewTaskData::new("Aria", "Second", Frequency::Monthly))
            .await
            .unwrap();

        wait_until(|| {
            let repo = repo.clone();
            async move { repo.tasks().await.len() == 2 }
        })
        .await;
    }
}
