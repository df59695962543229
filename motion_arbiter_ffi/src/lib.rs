#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use motion_arbiter_core::{
    classify_shift, side_lane_exists, BehaviorStatus, ControlMode, EmergencyHandlerCfg,
    HazardLevel, HazardStatus, MrmBehavior, MrmState, ShiftKind, TurningHazardOn, WireCode,
};
use motion_arbiter_supervisor::{
    EmergencyHandler, HandlerMessages, HandlerSnapshot, HazardSnapshotStore, ManualClock,
    MrmBehaviorClient, MrmStateMsg, OperateMrmRequest, OperateMrmResponse, ServiceError,
};

/// FFI ABI version for motion_arbiter_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function signature changes.
pub const MOTION_ARBITER_FFI_VERSION: u32 = 1;

#[no_mangle]
pub extern "C" fn motion_arbiter_ffi_version() -> u32 {
    MOTION_ARBITER_FFI_VERSION
}

/// Operate/cancel callback.
///
/// `behavior` is the MRM behavior wire code, `operate` is 1 to activate and 0
/// to cancel. Return 1 on success, 0 on a rejected request, negative when no
/// answer came back in time (the call is retried on a later tick).
pub type MaOperateFn =
    Option<unsafe extern "C" fn(user: *mut c_void, behavior: u8, operate: u8) -> i32>;

struct CallbackClient {
    operate: MaOperateFn,
    user: *mut c_void,
}

// The host owns `user` and promises it may be used from the ticking thread.
unsafe impl Send for CallbackClient {}

impl MrmBehaviorClient for CallbackClient {
    fn operate(
        &mut self,
        behavior: MrmBehavior,
        request: OperateMrmRequest,
        wait: Duration,
    ) -> Result<OperateMrmResponse, ServiceError> {
        let Some(cb) = self.operate else {
            return Err(ServiceError::Disconnected { service: behavior });
        };
        let rc = unsafe { cb(self.user, behavior.to_code(), u8::from(request.operate)) };
        match rc {
            1 => Ok(OperateMrmResponse { success: true }),
            0 => Ok(OperateMrmResponse { success: false }),
            _ => Err(ServiceError::Timeout {
                service: behavior,
                waited: wait,
            }),
        }
    }
}

/// Opaque handle exposed over FFI.
pub struct MaHandler {
    clock: Arc<ManualClock>,
    store: Arc<HazardSnapshotStore>,
    inner: EmergencyHandler,
}

/// Emergency handler cfg for FFI. Flags are 0/1; timeouts are seconds, and
/// non-finite or negative values are replaced by the defaults.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MaCfg {
    pub update_rate: u32,
    pub timeout_hazard_status: f64,
    pub use_parking_after_stopped: u8,
    pub use_comfortable_stop: u8,
    pub turning_hazard_on_emergency: u8,
    pub service_timeout: f64,
}

/// Wire-coded MRM state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaMrmState {
    pub state: u8,
    pub behavior: u8,
    pub stamp_nanos: u64,
}

/// One tick's published commands, wire coded.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaOutput {
    pub hazard_lights: u8,
    pub gear: u8,
    pub mrm_state: MaMrmState,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaShiftKind {
    None = 0,
    Avoid = 1,
    Return = 2,
    LeftMiddle = 3,
    RightMiddle = 4,
}

#[no_mangle]
pub extern "C" fn motion_arbiter_cfg_default() -> MaCfg {
    let d = EmergencyHandlerCfg::default();
    MaCfg {
        update_rate: d.update_rate,
        timeout_hazard_status: d.timeout_hazard_status,
        use_parking_after_stopped: u8::from(d.use_parking_after_stopped),
        use_comfortable_stop: u8::from(d.use_comfortable_stop),
        turning_hazard_on_emergency: u8::from(d.turning_hazard_on.emergency),
        service_timeout: d.service_timeout,
    }
}

/// Non-finite or negative seconds fall back to the default.
fn seconds_or_default(key: &str, secs: f64, default: f64) -> f64 {
    if secs.is_finite() && secs >= 0.0 {
        secs
    } else {
        warn!(key, secs, default, "invalid timeout in cfg, using default");
        default
    }
}

fn cfg_from_ffi(c: MaCfg) -> EmergencyHandlerCfg {
    let d = EmergencyHandlerCfg::default();
    EmergencyHandlerCfg {
        update_rate: c.update_rate.max(1),
        timeout_hazard_status: seconds_or_default(
            "timeout_hazard_status",
            c.timeout_hazard_status,
            d.timeout_hazard_status,
        ),
        use_parking_after_stopped: c.use_parking_after_stopped != 0,
        use_comfortable_stop: c.use_comfortable_stop != 0,
        turning_hazard_on: TurningHazardOn {
            emergency: c.turning_hazard_on_emergency != 0,
        },
        service_timeout: seconds_or_default("service_timeout", c.service_timeout, d.service_timeout),
    }
}

fn state_to_ffi(s: &MrmState) -> MaMrmState {
    let msg = MrmStateMsg::from(s);
    MaMrmState {
        state: msg.state,
        behavior: msg.behavior,
        stamp_nanos: msg.stamp_nanos,
    }
}

fn shift_kind_to_ffi(k: ShiftKind) -> MaShiftKind {
    match k {
        ShiftKind::None => MaShiftKind::None,
        ShiftKind::Avoid => MaShiftKind::Avoid,
        ShiftKind::Return => MaShiftKind::Return,
        ShiftKind::LeftMiddle => MaShiftKind::LeftMiddle,
        ShiftKind::RightMiddle => MaShiftKind::RightMiddle,
    }
}

fn shift_kind_from_code(code: u8) -> Option<ShiftKind> {
    Some(match code {
        0 => ShiftKind::None,
        1 => ShiftKind::Avoid,
        2 => ShiftKind::Return,
        3 => ShiftKind::LeftMiddle,
        4 => ShiftKind::RightMiddle,
        _ => return None,
    })
}

/// Create a new handler. Time starts at `start_nanos` and only moves through
/// `motion_arbiter_set_time`.
///
/// This library does not spawn threads; the host calls `motion_arbiter_tick`
/// at the configured rate.
#[no_mangle]
pub extern "C" fn motion_arbiter_handler_new(
    cfg: MaCfg,
    start_nanos: u64,
    operate: MaOperateFn,
    user: *mut c_void,
) -> *mut MaHandler {
    let clock = Arc::new(ManualClock::new(Duration::from_nanos(start_nanos)));
    let store = Arc::new(HazardSnapshotStore::new(clock.clone()));
    let client = CallbackClient { operate, user };
    let inner = EmergencyHandler::new(cfg_from_ffi(cfg), store.clone(), Box::new(client));
    Box::into_raw(Box::new(MaHandler {
        clock,
        store,
        inner,
    }))
}

#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_handler_free(h: *mut MaHandler) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_set_time(h: *mut MaHandler, now_nanos: u64) -> i32 {
    let Some(handle) = h.as_ref() else {
        return -1;
    };
    handle.clock.set(Duration::from_nanos(now_nanos));
    0
}

/// Hazard report, stamped with the handler's current time. Returns -2 on an
/// unknown level code.
#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_set_hazard_status(
    h: *mut MaHandler,
    level: u8,
    emergency: u8,
    emergency_holding: u8,
) -> i32 {
    let Some(handle) = h.as_ref() else {
        return -1;
    };
    let Ok(level) = HazardLevel::from_code(level) else {
        return -2;
    };
    handle.store.set_hazard_status(HazardStatus {
        level,
        emergency: emergency != 0,
        emergency_holding: emergency_holding != 0,
    });
    0
}

#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_set_speed(h: *mut MaHandler, linear_x: f64) -> i32 {
    let Some(handle) = h.as_ref() else {
        return -1;
    };
    handle.store.set_speed(linear_x);
    0
}

#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_set_control_mode(h: *mut MaHandler, mode: u8) -> i32 {
    let Some(handle) = h.as_ref() else {
        return -1;
    };
    let Ok(mode) = ControlMode::from_code(mode) else {
        return -2;
    };
    handle.store.set_control_mode(mode);
    0
}

/// Status of one MRM behavior module; `behavior` is the behavior wire code
/// (2 emergency stop, 3 comfortable stop).
#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_set_behavior_status(
    h: *mut MaHandler,
    behavior: u8,
    status: u8,
) -> i32 {
    let Some(handle) = h.as_ref() else {
        return -1;
    };
    let Ok(status) = BehaviorStatus::from_code(status) else {
        return -2;
    };
    match MrmBehavior::from_code(behavior) {
        Ok(MrmBehavior::ComfortableStop) => handle.store.set_comfortable_stop_status(status),
        Ok(MrmBehavior::EmergencyStop) => handle.store.set_emergency_stop_status(status),
        _ => return -3,
    }
    0
}

/// Run one tick. Returns 1 and fills `out` when commands are to be
/// published, 0 when the tick was skipped.
#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_tick(h: *mut MaHandler, out: *mut MaOutput) -> i32 {
    let Some(handle) = h.as_ref() else {
        return -1;
    };
    let Some(result) = handle.inner.on_timer() else {
        return 0;
    };

    let wire = HandlerMessages::from(&result);
    if let Some(out) = out.as_mut() {
        *out = MaOutput {
            hazard_lights: wire.hazard_lights.command,
            gear: wire.gear.command,
            mrm_state: state_to_ffi(&result.mrm_state),
        };
    }
    1
}

#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_get_state(h: *mut MaHandler) -> MaMrmState {
    match h.as_ref() {
        Some(handle) => state_to_ffi(&handle.inner.mrm_state()),
        None => MaMrmState::default(),
    }
}

/// Overwrite the MRM state, e.g. after a process restart.
///
/// An invalid state or behavior code is a broken contract with the host and
/// aborts the process.
#[no_mangle]
pub unsafe extern "C" fn motion_arbiter_restore_state(h: *mut MaHandler, state: MaMrmState) -> i32 {
    let Some(handle) = h.as_ref() else {
        return -1;
    };

    let msg = MrmStateMsg {
        stamp_nanos: state.stamp_nanos,
        state: state.state,
        behavior: state.behavior,
    };
    let mrm_state = match msg.decode() {
        Ok(v) => v,
        Err(err) => {
            error!(%err, "invalid MRM state handed to restore");
            std::process::abort();
        }
    };

    handle.inner.restore(HandlerSnapshot {
        mrm_state,
        pending: Vec::new(),
    });
    0
}

#[no_mangle]
pub extern "C" fn motion_arbiter_classify_shift(start: f64, end: f64, threshold: f64) -> MaShiftKind {
    shift_kind_to_ffi(classify_shift(start, end, threshold))
}

/// 1 when the maneuver has a lane on its side, 0 when it must be vetoed, -1
/// on an unknown kind code.
#[no_mangle]
pub extern "C" fn motion_arbiter_side_lane_exists(
    kind: u8,
    relative_shift: f64,
    has_left_lane: u8,
    has_right_lane: u8,
) -> i32 {
    let Some(kind) = shift_kind_from_code(kind) else {
        return -1;
    };
    i32::from(side_lane_exists(
        kind,
        relative_shift,
        has_left_lane != 0,
        has_right_lane != 0,
    ))
}
