//! Timer-driven loop around the [`Brain`]: select, execute, record, notify.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::activity::ActivityResult;
use crate::brain::Brain;
use crate::memory::{MemoryEntry, MemoryStore};
use crate::state::AgentState;

pub const HISTORY_CAPACITY: usize = 100;
const MEMORY_UPDATE_SIZE: usize = 10;
const EVENT_BUFFER: usize = 256;

/// Notifications for observers. Subscribe with [`Controller::subscribe`];
/// dropping the receiver unsubscribes.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    ActivitySelected { activity: String },
    ActivityCompleted { activity: String, result: ActivityResult },
    StateChanged(Box<AgentState>),
    Log(String),
    /// Newest memory entries after a write
    MemoryUpdate(Vec<MemoryEntry>),
}

pub struct Controller {
    brain: Arc<Brain>,
    memory: Arc<MemoryStore>,
    history: Mutex<VecDeque<ActivityResult>>,
    events: broadcast::Sender<ControllerEvent>,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Supervisors of spawned cycles; each finishes when its cycle does
    cycles: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("brain", &self.brain)
            .field("memory", &self.memory)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Controller {
    pub fn new(brain: Arc<Brain>, memory: Arc<MemoryStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            brain,
            memory,
            history: Mutex::new(VecDeque::new()),
            events,
            timer: Mutex::new(None),
            cycles: Mutex::new(JoinSet::new()),
        }
    }

    pub fn brain(&self) -> &Arc<Brain> {
        &self.brain
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.emit(ControllerEvent::Log(message));
    }

    fn log_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.emit(ControllerEvent::Log(message));
    }

    fn timer_guard(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cycles_guard(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.cycles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn history_guard(&self) -> MutexGuard<'_, VecDeque<ActivityResult>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.timer_guard()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one cycle now, then one every `period`. Returns false if the loop
    /// was already running. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>, period: Duration) -> bool {
        let mut timer = self.timer_guard();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            self.log("Controller is already running");
            return false;
        }

        let period = period.max(Duration::from_millis(1));
        self.log(format!("Starting activity loop every {:?}", period));

        let controller = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately.
                ticker.tick().await;
                controller.spawn_cycle();
            }
        }));
        true
    }

    /// Stop scheduling new cycles. A cycle already in flight runs to the end.
    pub fn stop(&self) -> bool {
        match self.timer_guard().take() {
            Some(handle) => {
                handle.abort();
                self.log("Controller stopped");
                true
            }
            None => false,
        }
    }

    /// Cycles run as separate tasks so a slow activity never delays the
    /// timer. A panic is reported here and the loop carries on.
    fn spawn_cycle(self: &Arc<Self>) {
        let cycle = {
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                controller.run_cycle().await;
            })
        };

        let supervisor = Arc::clone(self);
        let mut cycles = self.cycles_guard();
        while cycles.try_join_next().is_some() {}
        cycles.spawn(async move {
            if let Err(e) = cycle.await {
                if e.is_panic() {
                    supervisor.log_error(format!("Activity cycle panicked: {}", panic_message(e)));
                } else {
                    warn!("Activity cycle cancelled: {}", e);
                }
            }
        });
    }

    /// Stop the timer and wait for every cycle already in flight, so each
    /// one reaches its memory write before the runtime goes away.
    pub async fn shutdown(&self) {
        self.stop();
        let mut cycles = std::mem::take(&mut *self.cycles_guard());
        let pending = cycles.len();
        if pending > 0 {
            self.log(format!("Waiting for {} in-flight cycle(s)", pending));
        }
        while cycles.join_next().await.is_some() {}
    }

    /// Select and run one activity. `None` when nothing is runnable; nothing
    /// is executed or recorded in that case.
    pub async fn run_cycle(&self) -> Option<ActivityResult> {
        let Some(activity) = self.brain.select_next() else {
            self.log("No activities available to run");
            return None;
        };

        let name = activity.name().to_string();
        self.emit(ControllerEvent::ActivitySelected {
            activity: name.clone(),
        });
        self.log(format!("Selected activity: {}", name));

        Some(self.execute_and_record(&name, &Value::Null).await)
    }

    /// Run `name` right away, bypassing selection. `None` if no such
    /// activity is registered.
    pub async fn execute_on_demand(&self, name: &str, params: &Value) -> Option<ActivityResult> {
        if self.brain.activity(name).is_none() {
            self.log(format!("Activity not found: {}", name));
            return None;
        }
        Some(self.execute_and_record(name, params).await)
    }

    async fn execute_and_record(&self, name: &str, params: &Value) -> ActivityResult {
        let result = self.brain.execute(name, params).await;

        {
            let mut history = self.history_guard();
            history.push_back(result.clone());
            while history.len() > HISTORY_CAPACITY {
                history.pop_front();
            }
        }

        if let Err(e) = self.memory.record(MemoryEntry::from_result(name, &result)) {
            self.log_error(format!("Failed to record memory for {}: {}", name, e));
        }

        match &result.error {
            None => self.log(format!("Completed activity: {}", name)),
            Some(error) => self.log(format!("Activity {} failed: {}", name, error)),
        }

        self.emit(ControllerEvent::ActivityCompleted {
            activity: name.to_string(),
            result: result.clone(),
        });
        self.emit(ControllerEvent::MemoryUpdate(self.memory.recent(MEMORY_UPDATE_SIZE, 0)));
        self.emit(ControllerEvent::StateChanged(Box::new(self.brain.state())));

        result
    }

    /// Results of this session, oldest first
    pub fn history(&self) -> Vec<ActivityResult> {
        self.history_guard().iter().cloned().collect()
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Activity, ActivityContext};
    use crate::credentials::CredentialStore;
    use crate::test_support::{memory_store, persister};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Counter {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        panics: bool,
    }

    #[async_trait]
    impl Activity for Counter {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "counts runs"
        }
        fn energy_cost(&self) -> f64 {
            0.0
        }
        async fn execute(&self, _ctx: &ActivityContext, params: &Value) -> ActivityResult {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panics {
                panic!("counter exploded on run {}", run);
            }
            ActivityResult::success(json!({ "run": run, "params": params }))
        }
    }

    fn controller_with(activities: Vec<Arc<dyn Activity>>) -> Arc<Controller> {
        let brain = Arc::new(Brain::new(persister(), CredentialStore::new()));
        brain.register_all(activities);
        Arc::new(Controller::new(brain, memory_store()))
    }

    fn counter(name: &'static str, panics: bool) -> (Arc<dyn Activity>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let activity = Arc::new(Counter {
            name,
            runs: runs.clone(),
            panics,
        });
        (activity, runs)
    }

    /// Blocks inside `execute` until released
    struct Gated {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Activity for Gated {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "waits to be released"
        }
        fn energy_cost(&self) -> f64 {
            0.1
        }
        async fn execute(&self, _ctx: &ActivityContext, _params: &Value) -> ActivityResult {
            self.started.notify_one();
            self.release.notified().await;
            ActivityResult::success(json!({ "released": true }))
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_cycle_with_nothing_runnable_only_logs() {
        let controller = controller_with(vec![]);
        let mut events = controller.subscribe();

        assert!(controller.run_cycle().await.is_none());
        assert!(controller.memory().is_empty());
        assert!(controller.history().is_empty());
        assert!(matches!(events.try_recv(), Ok(ControllerEvent::Log(_))));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cycle_records_and_notifies_in_order() {
        let (activity, runs) = counter("tick", false);
        let controller = controller_with(vec![activity]);
        let mut events = controller.subscribe();

        let result = controller.run_cycle().await.unwrap();
        assert!(result.success);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(controller.history().len(), 1);

        let memory = controller.memory().recent(10, 0);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory[0].activity_type, "tick");

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                ControllerEvent::Log(_) => {}
                ControllerEvent::ActivitySelected { activity } => kinds.push(format!("selected:{}", activity)),
                ControllerEvent::ActivityCompleted { activity, .. } => kinds.push(format!("completed:{}", activity)),
                ControllerEvent::MemoryUpdate(entries) => kinds.push(format!("memory:{}", entries.len())),
                ControllerEvent::StateChanged(_) => kinds.push("state".to_string()),
            }
        }
        assert_eq!(kinds, vec!["selected:tick", "completed:tick", "memory:1", "state"]);
    }

    #[tokio::test]
    async fn test_on_demand_passes_params_and_rejects_unknown() {
        let (activity, _) = counter("tick", false);
        let controller = controller_with(vec![activity]);

        assert!(controller.execute_on_demand("nope", &Value::Null).await.is_none());
        assert!(controller.memory().is_empty());

        let result = controller
            .execute_on_demand("tick", &json!({"source": "operator"}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["params"]["source"], "operator");
        assert_eq!(controller.memory().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let (activity, _) = counter("tick", false);
        let controller = controller_with(vec![activity]);
        for _ in 0..HISTORY_CAPACITY + 5 {
            controller.execute_on_demand("tick", &Value::Null).await;
        }
        let history = controller.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.last().unwrap().data.as_ref().unwrap()["run"], HISTORY_CAPACITY + 5);
    }

    #[tokio::test]
    async fn test_start_runs_immediately_and_ignores_second_start() {
        let (activity, runs) = counter("tick", false);
        let controller = controller_with(vec![activity]);

        assert!(controller.start(Duration::from_secs(3600)));
        wait_for(|| runs.load(Ordering::SeqCst) == 1).await;
        assert!(controller.is_running());
        assert!(!controller.start(Duration::from_secs(3600)));

        assert!(controller.stop());
        assert!(!controller.is_running());
        assert!(!controller.stop());
    }

    #[tokio::test]
    async fn test_panicking_activity_does_not_stop_timer() {
        let (activity, runs) = counter("boom", true);
        let controller = controller_with(vec![activity]);
        let mut events = controller.subscribe();

        controller.start(Duration::from_millis(20));
        let reported = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(ControllerEvent::Log(message)) if message.contains("panicked") => return true,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        })
        .await;
        assert_eq!(reported, Ok(true));

        wait_for(|| runs.load(Ordering::SeqCst) >= 2).await;
        assert!(controller.is_running());
        controller.stop();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_cycle() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let controller = controller_with(vec![Arc::new(Gated {
            started: started.clone(),
            release: release.clone(),
        })]);

        controller.start(Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(5), started.notified())
            .await
            .unwrap();

        let draining = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!draining.is_finished());
        assert!(!controller.is_running());
        assert!(controller.memory().is_empty());

        release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), draining)
            .await
            .unwrap()
            .unwrap();

        let recorded = controller.memory().recent(10, 0);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].activity_type, "slow");
        assert!(recorded[0].success);
    }
}
