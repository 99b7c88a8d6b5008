//! Minimal in-process action scheduler.
//!
//! Actions are identified by name. A recurring action is rescheduled before
//! its handler runs, so a failing handler never stops the recurrence. Task
//! parameters live in a separate [`TaskMetaStore`] keyed by a generated meta
//! id; one-shot meta is removed once the action has fired.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// When an action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    OneShot { at: DateTime<Utc> },
    Recurring { next: DateTime<Utc>, interval: Duration },
}

impl Schedule {
    pub fn next_run(&self) -> DateTime<Utc> {
        match self {
            Self::OneShot { at } => *at,
            Self::Recurring { next, .. } => *next,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Complete,
    Canceled,
}

/// One scheduled action instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAction {
    pub id: u64,
    pub action: String,
    pub schedule: Schedule,
    pub status: ActionStatus,
    pub meta_id: Option<Uuid>,
}

/// An action that is due, with its parameters resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub action_id: u64,
    pub action: String,
    pub params: Value,
    pub one_shot: bool,
    pub meta_id: Option<Uuid>,
}

/// Parameters of scheduled actions, keyed by meta id.
#[derive(Debug, Default)]
pub struct TaskMetaStore {
    values: Mutex<HashMap<Uuid, Value>>,
}

impl TaskMetaStore {
    pub fn put(&self, value: Value) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut values) = self.values.lock() {
            values.insert(id, value);
        }
        id
    }

    pub fn get(&self, id: Uuid) -> Option<Value> {
        self.values.lock().ok().and_then(|v| v.get(&id).cloned())
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.values
            .lock()
            .map(|mut v| v.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct TaskScheduler {
    actions: Mutex<Vec<ScheduledAction>>,
    meta: TaskMetaStore,
    next_id: AtomicU64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meta(&self) -> &TaskMetaStore {
        &self.meta
    }

    fn schedule(&self, action: &str, schedule: Schedule, unique: bool, params: Option<Value>) -> u64 {
        let Ok(mut actions) = self.actions.lock() else {
            return 0;
        };

        if unique {
            if let Some(existing) = actions
                .iter()
                .find(|a| a.action == action && a.status == ActionStatus::Pending)
            {
                debug!(action = %action, action_id = existing.id, "task_already_scheduled");
                return existing.id;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let meta_id = params.map(|p| self.meta.put(p));
        actions.push(ScheduledAction {
            id,
            action: action.to_string(),
            schedule,
            status: ActionStatus::Pending,
            meta_id,
        });

        info!(
            action = %action,
            action_id = id,
            next_run = %schedule.next_run(),
            "task_scheduled"
        );
        id
    }

    /// Cancel every pending instance of `action`. Returns how many were
    /// canceled.
    pub fn cancel(&self, action: &str) -> usize {
        let Ok(mut actions) = self.actions.lock() else {
            return 0;
        };

        let mut canceled = 0;
        for scheduled in actions
            .iter_mut()
            .filter(|a| a.action == action && a.status == ActionStatus::Pending)
        {
            scheduled.status = ActionStatus::Canceled;
            if let Some(meta_id) = scheduled.meta_id.take() {
                self.meta.delete(meta_id);
            }
            canceled += 1;
        }

        if canceled > 0 {
            info!(action = %action, canceled = canceled, "task_canceled");
        }
        canceled
    }

    pub fn is_scheduled(&self, action: &str) -> bool {
        !self.pending(action).is_empty()
    }

    /// Pending instances of `action`.
    pub fn pending(&self, action: &str) -> Vec<ScheduledAction> {
        self.actions
            .lock()
            .map(|actions| {
                actions
                    .iter()
                    .filter(|a| a.action == action && a.status == ActionStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, id: u64) -> Option<ScheduledAction> {
        self.actions
            .lock()
            .ok()
            .and_then(|actions| actions.iter().find(|a| a.id == id).cloned())
    }

    /// Collect every action due at `now`. One-shot actions are completed;
    /// recurring ones move to their first slot after `now`, skipping any
    /// that were missed.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Firing> {
        let Ok(mut actions) = self.actions.lock() else {
            return Vec::new();
        };

        let mut firings = Vec::new();
        for scheduled in actions
            .iter_mut()
            .filter(|a| a.status == ActionStatus::Pending && a.schedule.next_run() <= now)
        {
            let params = scheduled
                .meta_id
                .and_then(|id| self.meta.get(id))
                .unwrap_or(Value::Null);

            let one_shot = match &mut scheduled.schedule {
                Schedule::OneShot { .. } => {
                    scheduled.status = ActionStatus::Complete;
                    true
                }
                Schedule::Recurring { next, interval } => {
                    *next = next_slot(*next, *interval, now);
                    false
                }
            };

            firings.push(Firing {
                action_id: scheduled.id,
                action: scheduled.action.clone(),
                params,
                one_shot,
                meta_id: scheduled.meta_id,
            });
        }

        // Completed and canceled actions are dropped.
        actions.retain(|a| a.status == ActionStatus::Pending);
        firings
    }
}

/// First `next + k * interval` (k >= 1) strictly after `now`. Intervals
/// under a second are treated as one second.
fn next_slot(next: DateTime<Utc>, interval: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let step = interval.max(Duration::seconds(1)).num_milliseconds();
    let behind = (now - next).num_milliseconds().max(0);
    next + Duration::milliseconds(step * (behind / step + 1))
}

/// Fluent registration of a scheduled action.
pub struct Task;

impl Task {
    pub fn builder(action: &str) -> TaskBuilder {
        TaskBuilder {
            action: action.to_string(),
            schedule: None,
            unique: false,
            params: None,
        }
    }
}

pub struct TaskBuilder {
    action: String,
    schedule: Option<Schedule>,
    unique: bool,
    params: Option<Value>,
}

impl TaskBuilder {
    /// Run once, as soon as possible.
    pub fn one_shot(self) -> Self {
        self.one_shot_at(Utc::now())
    }

    pub fn one_shot_at(mut self, at: DateTime<Utc>) -> Self {
        self.schedule = Some(Schedule::OneShot { at });
        self
    }

    pub fn recurring(mut self, first_run: DateTime<Utc>, interval: Duration) -> Self {
        self.schedule = Some(Schedule::Recurring {
            next: first_run,
            interval,
        });
        self
    }

    /// Do not schedule when an instance of the action is already pending.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Register with `scheduler` and return the action id (the existing one
    /// for unique actions that are already pending).
    pub fn register(self, scheduler: &TaskScheduler) -> u64 {
        let schedule = self.schedule.unwrap_or(Schedule::OneShot { at: Utc::now() });
        scheduler.schedule(&self.action, schedule, self.unique, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unique_registration_returns_existing_id() {
        let scheduler = TaskScheduler::new();
        let now = Utc::now();
        let first = Task::builder("sweep")
            .recurring(now, Duration::seconds(60))
            .unique()
            .register(&scheduler);
        let second = Task::builder("sweep")
            .recurring(now, Duration::seconds(60))
            .unique()
            .register(&scheduler);

        assert_eq!(first, second);
        assert_eq!(scheduler.pending("sweep").len(), 1);
    }

    #[test]
    fn test_non_unique_one_shots_stack() {
        let scheduler = TaskScheduler::new();
        let a = Task::builder("send").one_shot().params(json!({"n": 1})).register(&scheduler);
        let b = Task::builder("send").one_shot().params(json!({"n": 2})).register(&scheduler);
        assert_ne!(a, b);
        assert_eq!(scheduler.meta().len(), 2);
    }

    #[test]
    fn test_recurring_reschedules_and_one_shot_completes() {
        let scheduler = TaskScheduler::new();
        let start = Utc::now();
        let recurring = Task::builder("tick")
            .recurring(start, Duration::seconds(60))
            .register(&scheduler);
        let once = Task::builder("once")
            .one_shot_at(start)
            .params(json!({"entry_id": "x"}))
            .register(&scheduler);

        assert!(scheduler.take_due(start - Duration::seconds(1)).is_empty());

        let firings = scheduler.take_due(start);
        assert_eq!(firings.len(), 2);
        let fired_once = firings.iter().find(|f| f.action_id == once).unwrap();
        assert!(fired_once.one_shot);
        assert_eq!(fired_once.params["entry_id"], "x");

        assert!(scheduler.get(once).is_none());
        let next = scheduler.get(recurring).unwrap().schedule.next_run();
        assert_eq!(next, start + Duration::seconds(60));
    }

    #[test]
    fn test_late_recurring_skips_missed_slots() {
        let scheduler = TaskScheduler::new();
        let start = Utc::now();
        let id = Task::builder("tick")
            .recurring(start, Duration::seconds(60))
            .register(&scheduler);

        let much_later = start + Duration::hours(5) + Duration::seconds(10);
        assert_eq!(scheduler.take_due(much_later).len(), 1);

        let next = scheduler.get(id).unwrap().schedule.next_run();
        assert_eq!(next, start + Duration::minutes(301));
        assert!(next > much_later);

        // Nothing fires again on the following tick.
        assert!(scheduler.take_due(much_later + Duration::seconds(5)).is_empty());
    }

    #[test]
    fn test_fire_exactly_on_slot_moves_one_interval() {
        let scheduler = TaskScheduler::new();
        let start = Utc::now();
        let id = Task::builder("tick")
            .recurring(start, Duration::seconds(60))
            .register(&scheduler);

        let on_slot = start + Duration::seconds(120);
        scheduler.take_due(on_slot);
        assert_eq!(
            scheduler.get(id).unwrap().schedule.next_run(),
            start + Duration::seconds(180)
        );
    }

    #[test]
    fn test_cancel_drops_meta() {
        let scheduler = TaskScheduler::new();
        Task::builder("send").one_shot().params(json!({})).register(&scheduler);
        Task::builder("send").one_shot().params(json!({})).register(&scheduler);

        assert_eq!(scheduler.cancel("send"), 2);
        assert!(!scheduler.is_scheduled("send"));
        assert!(scheduler.meta().is_empty());
        assert_eq!(scheduler.cancel("send"), 0);
    }
}
