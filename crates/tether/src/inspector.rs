//! # Runtime Inspector
//!
//! Development aid that records what a runtime does:
//!
//! - **Action history**: bounded ring; bursts of the same action from the
//!   same player are folded into one record with a count
//! - **State snapshots**: one per change, bounded by count and by an
//!   approximate memory budget
//! - **Patch counter**: total patches seen
//! - **Submission counter**: actions submitted, including rejected ones
//!
//! Sizes are the length of the JSON encoding, which is close enough to
//! compare snapshots against each other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{Patch, State};
use tether_networking::Subscription;

use crate::error::ConfigError;
use crate::runtime::{ActionInfo, ActionRequest, Runtime};

/// Inspector limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Action records kept.
    pub max_actions: usize,
    /// State snapshots kept.
    pub max_snapshots: usize,
    /// Repeats of one action within this window share a record.
    pub aggregate_window_ms: u64,
    /// Approximate bytes of snapshot data kept.
    pub memory_budget_bytes: usize,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            max_actions: 256,
            max_snapshots: 64,
            aggregate_window_ms: 250,
            memory_budget_bytes: 1024 * 1024,
        }
    }
}

impl InspectorConfig {
    /// Rejects zero limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the zero field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("inspector.max_actions", self.max_actions == 0),
            ("inspector.max_snapshots", self.max_snapshots == 0),
            ("inspector.memory_budget_bytes", self.memory_budget_bytes == 0),
        ];
        match fields.iter().find(|(_, zero)| *zero) {
            Some((name, _)) => Err(ConfigError::Invalid(format!("{name} must be greater than zero"))),
            None => Ok(()),
        }
    }

    fn aggregate_window(&self) -> Duration {
        Duration::from_millis(self.aggregate_window_ms)
    }
}

/// One (possibly folded) action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionRecord {
    /// Sequence number of the first action in this record.
    pub id: u64,
    /// Milliseconds since the Unix epoch of the latest action.
    pub timestamp: u64,
    /// Action name.
    pub action_name: String,
    /// Input of the latest action.
    pub input: Value,
    /// Submitting player.
    pub player_id: String,
    /// Target named by the submitter.
    pub target_id: Option<String>,
    /// Actions folded into this record.
    pub count: u32,
    /// Total execution time of the folded actions.
    pub duration: Duration,
    /// True if the runtime only forwarded these actions.
    pub forwarded: bool,
}

/// State captured after a change.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// Tick of the state.
    pub tick: u64,
    /// The state.
    pub state: State,
    /// Length of the JSON encoding.
    pub size_bytes: usize,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

struct InspectorState {
    config: InspectorConfig,
    actions: VecDeque<ActionRecord>,
    /// When the newest record last absorbed an action.
    last_action_at: Option<Instant>,
    next_id: u64,
    snapshots: VecDeque<StateSnapshot>,
    snapshot_bytes: usize,
    patch_count: u64,
    submissions: u64,
}

impl InspectorState {
    fn record_action(&mut self, info: &ActionInfo, now: Instant) {
        let window = self.config.aggregate_window();
        let within = self.last_action_at.is_some_and(|at| now.duration_since(at) <= window);
        if within {
            if let Some(last) = self.actions.back_mut() {
                if last.action_name == info.name
                    && last.player_id == info.player_id
                    && last.target_id == info.target_id
                {
                    last.count += 1;
                    last.duration += info.duration;
                    last.input = info.input.clone();
                    last.timestamp = unix_millis();
                    self.last_action_at = Some(now);
                    return;
                }
            }
        }

        self.next_id += 1;
        self.actions.push_back(ActionRecord {
            id: self.next_id,
            timestamp: unix_millis(),
            action_name: info.name.clone(),
            input: info.input.clone(),
            player_id: info.player_id.clone(),
            target_id: info.target_id.clone(),
            count: 1,
            duration: info.duration,
            forwarded: info.forwarded,
        });
        self.last_action_at = Some(now);
        while self.actions.len() > self.config.max_actions {
            self.actions.pop_front();
        }
    }

    fn record_snapshot(&mut self, state: &State, tick: u64) {
        let size_bytes = serde_json::to_vec(state).map_or(0, |bytes| bytes.len());
        if size_bytes > self.config.memory_budget_bytes {
            tracing::warn!(tick, size_bytes, budget = self.config.memory_budget_bytes, "snapshot exceeds inspector budget, skipped");
            return;
        }

        self.snapshots.push_back(StateSnapshot {
            tick,
            state: state.clone(),
            size_bytes,
            timestamp: unix_millis(),
        });
        self.snapshot_bytes += size_bytes;
        while self.snapshots.len() > self.config.max_snapshots
            || self.snapshot_bytes > self.config.memory_budget_bytes
        {
            match self.snapshots.pop_front() {
                Some(evicted) => self.snapshot_bytes -= evicted.size_bytes,
                None => break,
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Records actions, patches and state changes of one runtime.
pub struct Inspector {
    state: Arc<Mutex<InspectorState>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Inspector {
    /// Creates a detached inspector.
    #[must_use]
    pub fn new(config: InspectorConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(InspectorState {
                config,
                actions: VecDeque::new(),
                last_action_at: None,
                next_id: 0,
                snapshots: VecDeque::new(),
                snapshot_bytes: 0,
                patch_count: 0,
                submissions: 0,
            })),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Starts recording `runtime`. Attaching again replaces the previous
    /// subscriptions; recorded data is kept.
    pub fn attach(&self, runtime: &Runtime) {
        self.detach();

        let on_submit = {
            let state = Arc::clone(&self.state);
            runtime.on_submit(Arc::new(move |_: &ActionRequest<'_>| {
                state.lock().submissions += 1;
            }))
        };
        let on_action = {
            let state = Arc::clone(&self.state);
            runtime.on_action(Arc::new(move |info: &ActionInfo| {
                state.lock().record_action(info, Instant::now());
            }))
        };
        let on_patch = {
            let state = Arc::clone(&self.state);
            runtime.on_patch(Arc::new(move |patches: &[Patch], _tick: u64| {
                state.lock().patch_count += patches.len() as u64;
            }))
        };
        let on_change = {
            let state = Arc::clone(&self.state);
            runtime.on_change(Arc::new(move |snapshot: &State, tick: u64| {
                state.lock().record_snapshot(snapshot, tick);
            }))
        };

        *self.subscriptions.lock() = vec![on_submit, on_action, on_patch, on_change];
        tracing::debug!(player = runtime.player_id(), "inspector attached");
    }

    /// Stops recording.
    pub fn detach(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Action records, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ActionRecord> {
        self.state.lock().actions.iter().cloned().collect()
    }

    /// Snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.state.lock().snapshots.iter().cloned().collect()
    }

    /// Snapshot at `tick`, if still retained.
    #[must_use]
    pub fn snapshot_at(&self, tick: u64) -> Option<StateSnapshot> {
        self.state.lock().snapshots.iter().find(|s| s.tick == tick).cloned()
    }

    /// Patches seen since creation or the last [`Inspector::clear`].
    #[must_use]
    pub fn patch_count(&self) -> u64 {
        self.state.lock().patch_count
    }

    /// Submissions seen, including ones that failed or were rejected.
    #[must_use]
    pub fn submission_count(&self) -> u64 {
        self.state.lock().submissions
    }

    /// Approximate bytes held by snapshots.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.state.lock().snapshot_bytes
    }

    /// Drops everything recorded. Stays attached.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.actions.clear();
        state.last_action_at = None;
        state.snapshots.clear();
        state.snapshot_bytes = 0;
        state.patch_count = 0;
        state.submissions = 0;
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        self.detach();
    }
}
