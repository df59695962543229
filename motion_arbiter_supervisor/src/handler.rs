//! Periodic owner of the MRM escalation machine.
//!
//! Each tick reads the snapshot store, advances `MrmState` through
//! `decide_mrm`, and issues the resulting cancel/activate calls with a bounded
//! wait. Unanswered calls are queued and retried on later ticks for as long as
//! they still agree with the recorded behavior.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use motion_arbiter_core::{
    decide_mrm, BehaviorChange, EmergencyHandlerCfg, GearCommand, HazardCommand, MrmBehavior,
    MrmInputs, MrmState,
};

use crate::behavior::{MrmBehaviorClient, OperateMrmRequest};
use crate::store::{HazardSnapshot, HazardSnapshotStore};

const WAITING_LOG_PERIOD: Duration = Duration::from_secs(5);
const STALE_LOG_PERIOD: Duration = Duration::from_secs(1);

/// What one tick publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerOutput {
    pub hazard_lights: HazardCommand,
    pub gear: GearCommand,
    pub mrm_state: MrmState,
}

/// An operate/cancel call that has not been answered yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCall {
    pub behavior: MrmBehavior,
    pub operate: bool,
}

impl PendingCall {
    /// Still worth sending given the currently recorded behavior.
    pub fn still_wanted(&self, current: MrmBehavior) -> bool {
        if self.operate {
            self.behavior == current
        } else {
            self.behavior != current
        }
    }

    fn verb(&self) -> &'static str {
        if self.operate {
            "operate"
        } else {
            "cancel"
        }
    }
}

/// Persistable handler state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSnapshot {
    pub mrm_state: MrmState,
    pub pending: Vec<PendingCall>,
}

/// Rate limit per log site.
#[derive(Debug, Default)]
struct Throttle {
    last: HashMap<&'static str, Duration>,
}

impl Throttle {
    fn ready(&mut self, key: &'static str, now: Duration, period: Duration) -> bool {
        match self.last.get(key) {
            Some(&t) if now.saturating_sub(t) < period => false,
            _ => {
                self.last.insert(key, now);
                true
            }
        }
    }
}

#[derive(Debug, Default)]
struct TickState {
    mrm: MrmState,
    pending: Vec<PendingCall>,
    throttle: Throttle,
}

pub struct EmergencyHandler {
    cfg: EmergencyHandlerCfg,
    store: Arc<HazardSnapshotStore>,
    // NOTE: behind Mutexes only for `&self` ticking; one thread drives the handler.
    client: Mutex<Box<dyn MrmBehaviorClient>>,
    state: Mutex<TickState>,
}

impl std::fmt::Debug for EmergencyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyHandler")
            .field("cfg", &self.cfg)
            .field("mrm_state", &self.mrm_state())
            .finish()
    }
}

impl EmergencyHandler {
    pub fn new(
        cfg: EmergencyHandlerCfg,
        store: Arc<HazardSnapshotStore>,
        client: Box<dyn MrmBehaviorClient>,
    ) -> Self {
        let state = TickState {
            mrm: MrmState {
                stamp: store.now(),
                ..MrmState::default()
            },
            ..TickState::default()
        };
        Self {
            cfg,
            store,
            client: Mutex::new(client),
            state: Mutex::new(state),
        }
    }

    pub fn cfg(&self) -> &EmergencyHandlerCfg {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<HazardSnapshotStore> {
        &self.store
    }

    pub fn mrm_state(&self) -> MrmState {
        self.lock_state().mrm
    }

    pub fn pending_calls(&self) -> Vec<PendingCall> {
        self.lock_state().pending.clone()
    }

    pub fn snapshot(&self) -> HandlerSnapshot {
        let st = self.lock_state();
        HandlerSnapshot {
            mrm_state: st.mrm,
            pending: st.pending.clone(),
        }
    }

    /// Overwrite the MRM state and pending calls, e.g. after a restart.
    pub fn restore(&self, snap: HandlerSnapshot) {
        let mut st = self.lock_state();
        st.mrm = snap.mrm_state;
        st.pending = snap.pending;
    }

    /// One periodic tick. `None` when inputs are not ready: nothing changed
    /// and nothing is to be published.
    pub fn on_timer(&self) -> Option<HandlerOutput> {
        let now = self.store.now();
        let snap = self.store.snapshot();
        let mut st = self.lock_state();

        if !self.is_data_ready(&snap, &mut st.throttle, now) {
            return None;
        }
        let hazard = snap.hazard?;

        let timeout = self.cfg.hazard_status_timeout();
        let is_stale = hazard.is_stale(now, timeout);
        if is_stale && st.throttle.ready("stale", now, STALE_LOG_PERIOD) {
            warn!(
                age = ?now.saturating_sub(hazard.stamp),
                ?timeout,
                "hazard status timed out, treating as single point fault"
            );
        }

        let inputs = MrmInputs {
            hazard: hazard.status,
            is_stale,
            control_mode: snap.control_mode_or_default(),
            speed: snap.speed_or_zero(),
        };
        let step = decide_mrm(&inputs, &self.cfg, &mut st.mrm, now);
        // published state carries the tick time
        st.mrm.stamp = now;

        let calls = Self::calls_for_tick(&st.pending, step.behavior_change, st.mrm.behavior);
        st.pending.clear();
        let output = HandlerOutput {
            hazard_lights: step.hazard_lights,
            gear: step.gear,
            mrm_state: st.mrm,
        };
        drop(st);

        // service calls may block up to the wait each; readers stay unblocked
        let unanswered = self.issue(calls);
        if !unanswered.is_empty() {
            self.lock_state().pending = unanswered;
        }

        Some(output)
    }

    /// Tick every `cfg.period()` on the calling thread until `shutdown`
    /// fires or disconnects.
    pub fn run<F: FnMut(&HandlerOutput)>(&self, shutdown: &Receiver<()>, mut publish: F) {
        let ticker = tick(self.cfg.period());
        loop {
            select! {
                recv(ticker) -> _ => {
                    if let Some(out) = self.on_timer() {
                        publish(&out);
                    }
                }
                recv(shutdown) -> _ => break,
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TickState> {
        self.state.lock().expect("emergency handler state mutex poisoned")
    }

    fn is_data_ready(&self, snap: &HazardSnapshot, throttle: &mut Throttle, now: Duration) -> bool {
        if snap.hazard.is_none() {
            if throttle.ready("wait_hazard", now, WAITING_LOG_PERIOD) {
                info!("waiting for hazard status");
            }
            return false;
        }

        if self.cfg.use_comfortable_stop && !snap.comfortable_stop_status().is_available() {
            if throttle.ready("wait_comfortable_stop", now, WAITING_LOG_PERIOD) {
                info!("waiting for comfortable stop to become available");
            }
            return false;
        }

        if !snap.emergency_stop_status().is_available() {
            if throttle.ready("wait_emergency_stop", now, WAITING_LOG_PERIOD) {
                info!("waiting for emergency stop to become available");
            }
            return false;
        }

        true
    }

    /// Surviving retries plus this tick's change, cancels before activations.
    fn calls_for_tick(
        pending: &[PendingCall],
        change: Option<BehaviorChange>,
        current: MrmBehavior,
    ) -> Vec<PendingCall> {
        let mut calls: Vec<PendingCall> = pending
            .iter()
            .copied()
            .filter(|c| c.still_wanted(current))
            .collect();

        if let Some(change) = change {
            if let Some(behavior) = change.cancel {
                calls.push(PendingCall {
                    behavior,
                    operate: false,
                });
            }
            if let Some(behavior) = change.activate {
                calls.push(PendingCall {
                    behavior,
                    operate: true,
                });
            }
        }

        let mut unique: Vec<PendingCall> = Vec::with_capacity(calls.len());
        for c in calls {
            if !unique.contains(&c) {
                unique.push(c);
            }
        }
        // stable: keeps queue order within cancels and within activations
        unique.sort_by_key(|c| c.operate);
        unique
    }

    /// Send each call; return the ones that got no answer.
    fn issue(&self, calls: Vec<PendingCall>) -> Vec<PendingCall> {
        if calls.is_empty() {
            return calls;
        }

        let wait = self.cfg.service_wait();
        let mut client = self
            .client
            .lock()
            .expect("behavior client mutex poisoned");

        let mut unanswered = Vec::new();
        for call in calls {
            let request = OperateMrmRequest {
                operate: call.operate,
            };
            match client.operate(call.behavior, request, wait) {
                Ok(resp) if resp.success => {
                    warn!("{} is {}", call.behavior, if call.operate { "operated" } else { "canceled" });
                }
                Ok(_) => {
                    error!("{} failed to {}", call.behavior, call.verb());
                }
                Err(err) => {
                    error!(%err, "{} request to {} unanswered, retrying next tick", call.verb(), call.behavior);
                    unanswered.push(call);
                }
            }
        }
        unanswered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(behavior: MrmBehavior, operate: bool) -> PendingCall {
        PendingCall { behavior, operate }
    }

    #[test]
    fn stale_retries_are_dropped() {
        let pending = vec![
            call(MrmBehavior::ComfortableStop, true),
            call(MrmBehavior::EmergencyStop, false),
        ];
        // comfortable stop got replaced by emergency stop in the meantime
        let calls = EmergencyHandler::calls_for_tick(&pending, None, MrmBehavior::EmergencyStop);
        assert!(calls.is_empty());
    }

    #[test]
    fn cancels_go_first_and_duplicates_collapse() {
        let pending = vec![call(MrmBehavior::EmergencyStop, true)];
        let change = BehaviorChange {
            cancel: Some(MrmBehavior::ComfortableStop),
            activate: Some(MrmBehavior::EmergencyStop),
        };
        let calls =
            EmergencyHandler::calls_for_tick(&pending, Some(change), MrmBehavior::EmergencyStop);
        assert_eq!(
            calls,
            vec![
                call(MrmBehavior::ComfortableStop, false),
                call(MrmBehavior::EmergencyStop, true),
            ]
        );
    }

    #[test]
    fn throttle_limits_per_key() {
        let mut t = Throttle::default();
        let p = Duration::from_secs(1);
        assert!(t.ready("a", Duration::from_millis(0), p));
        assert!(!t.ready("a", Duration::from_millis(500), p));
        assert!(t.ready("b", Duration::from_millis(500), p));
        assert!(t.ready("a", Duration::from_millis(1000), p));
    }
}
