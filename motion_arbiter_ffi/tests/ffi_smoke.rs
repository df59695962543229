//! FFI smoke tests.
//!
//! These call the exported `extern "C"` functions directly, as a host would:
//! - ABI surface compiles and links
//! - handler lifecycle with an operate callback
//! - invalid wire codes are rejected with negative return codes
//! - state restore round-trip

use std::ffi::c_void;
use std::ptr;

use motion_arbiter_ffi::*;

const SEC: u64 = 1_000_000_000;

#[derive(Default)]
struct Calls {
    log: Vec<(u8, u8)>,
    /// Answers to hand out before falling back to success.
    scripted: Vec<i32>,
}

unsafe extern "C" fn record(user: *mut c_void, behavior: u8, operate: u8) -> i32 {
    let calls = &mut *(user as *mut Calls);
    calls.log.push((behavior, operate));
    if calls.scripted.is_empty() {
        1
    } else {
        calls.scripted.remove(0)
    }
}

fn ready_handler(calls: &mut Calls) -> *mut MaHandler {
    let cfg = motion_arbiter_cfg_default();
    let h = motion_arbiter_handler_new(cfg, 100 * SEC, Some(record), calls as *mut Calls as *mut c_void);
    assert!(!h.is_null());
    unsafe {
        assert_eq!(motion_arbiter_set_control_mode(h, 1), 0);
        assert_eq!(motion_arbiter_set_speed(h, 5.0), 0);
        assert_eq!(motion_arbiter_set_behavior_status(h, 2, 1), 0);
        assert_eq!(motion_arbiter_set_hazard_status(h, 0, 0, 0), 0);
    }
    h
}

#[test]
fn ffi_version_and_default_cfg() {
    assert_eq!(motion_arbiter_ffi_version(), MOTION_ARBITER_FFI_VERSION);

    let cfg = motion_arbiter_cfg_default();
    assert_eq!(cfg.update_rate, 10);
    assert!(cfg.timeout_hazard_status.is_finite());
    assert_eq!(cfg.use_comfortable_stop, 0);
    assert_eq!(cfg.turning_hazard_on_emergency, 1);
}

#[test]
fn ffi_null_handle_is_rejected() {
    unsafe {
        assert_eq!(motion_arbiter_set_time(ptr::null_mut(), 0), -1);
        assert_eq!(motion_arbiter_set_speed(ptr::null_mut(), 0.0), -1);
        assert_eq!(motion_arbiter_tick(ptr::null_mut(), ptr::null_mut()), -1);
        assert_eq!(motion_arbiter_get_state(ptr::null_mut()), MaMrmState::default());
        motion_arbiter_handler_free(ptr::null_mut());
    }
}

#[test]
fn ffi_tick_waits_for_inputs() {
    let mut calls = Calls::default();
    let cfg = motion_arbiter_cfg_default();
    let h = motion_arbiter_handler_new(cfg, 100 * SEC, Some(record), &mut calls as *mut Calls as *mut c_void);
    let mut out = MaOutput::default();
    unsafe {
        assert_eq!(motion_arbiter_tick(h, &mut out), 0);
        assert_eq!(motion_arbiter_set_hazard_status(h, 0, 0, 0), 0);
        // emergency stop still reports not available
        assert_eq!(motion_arbiter_tick(h, &mut out), 0);
        assert_eq!(motion_arbiter_set_behavior_status(h, 2, 1), 0);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        motion_arbiter_handler_free(h);
    }
    assert_eq!(out.mrm_state.state, 1);
    assert_eq!(out.mrm_state.behavior, 1);
    assert!(calls.log.is_empty());
}

#[test]
fn ffi_bad_timeouts_fall_back_to_defaults() {
    let mut calls = Calls::default();
    let mut cfg = motion_arbiter_cfg_default();
    cfg.timeout_hazard_status = f64::INFINITY;
    cfg.service_timeout = f64::NAN;
    let h = motion_arbiter_handler_new(cfg, 100 * SEC, Some(record), &mut calls as *mut Calls as *mut c_void);
    let mut out = MaOutput::default();
    unsafe {
        assert_eq!(motion_arbiter_set_control_mode(h, 1), 0);
        assert_eq!(motion_arbiter_set_speed(h, 5.0), 0);
        assert_eq!(motion_arbiter_set_behavior_status(h, 2, 1), 0);
        assert_eq!(motion_arbiter_set_hazard_status(h, 0, 0, 0), 0);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        assert_eq!(out.mrm_state.state, 1);

        // the default 0.5 s timeout applies: one second of silence is stale
        assert_eq!(motion_arbiter_set_time(h, 101 * SEC), 0);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        assert_eq!(out.mrm_state.state, 2);
        assert_eq!(out.mrm_state.behavior, 2);
        motion_arbiter_handler_free(h);
    }
    assert_eq!(calls.log, vec![(2, 1)]);
}

#[test]
fn ffi_invalid_codes_are_rejected() {
    let mut calls = Calls::default();
    let h = ready_handler(&mut calls);
    unsafe {
        assert_eq!(motion_arbiter_set_hazard_status(h, 9, 1, 0), -2);
        assert_eq!(motion_arbiter_set_control_mode(h, 42), -2);
        assert_eq!(motion_arbiter_set_behavior_status(h, 2, 7), -2);
        // "none" is not a behavior module
        assert_eq!(motion_arbiter_set_behavior_status(h, 1, 1), -3);
        motion_arbiter_handler_free(h);
    }
}

#[test]
fn ffi_emergency_escalates_and_recovers() {
    let mut calls = Calls::default();
    let h = ready_handler(&mut calls);
    let mut out = MaOutput::default();
    unsafe {
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        assert_eq!(out.mrm_state.state, 1);
        assert_eq!(out.hazard_lights, 0);
        assert_eq!(out.gear, 2);

        assert_eq!(motion_arbiter_set_time(h, 100 * SEC + SEC / 10), 0);
        assert_eq!(motion_arbiter_set_hazard_status(h, 3, 1, 0), 0);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        assert_eq!(out.mrm_state.state, 2);
        assert_eq!(out.mrm_state.behavior, 2);
        assert_eq!(out.mrm_state.stamp_nanos, 100 * SEC + SEC / 10);
        assert_eq!(out.hazard_lights, 2);

        assert_eq!(motion_arbiter_set_time(h, 100 * SEC + 2 * SEC / 10), 0);
        assert_eq!(motion_arbiter_set_hazard_status(h, 0, 0, 0), 0);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        assert_eq!(out.mrm_state.state, 1);
        assert_eq!(out.mrm_state.behavior, 1);
        motion_arbiter_handler_free(h);
    }
    assert_eq!(calls.log, vec![(2, 1), (2, 0)]);
}

#[test]
fn ffi_unanswered_call_is_retried() {
    let mut calls = Calls {
        scripted: vec![-1],
        ..Calls::default()
    };
    let h = ready_handler(&mut calls);
    let mut out = MaOutput::default();
    unsafe {
        assert_eq!(motion_arbiter_set_hazard_status(h, 3, 1, 0), 0);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        assert_eq!(motion_arbiter_tick(h, &mut out), 1);
        motion_arbiter_handler_free(h);
    }
    assert_eq!(calls.log, vec![(2, 1), (2, 1)]);
}

#[test]
fn ffi_state_restore_roundtrip() {
    let mut calls = Calls::default();
    let h = ready_handler(&mut calls);
    let saved = MaMrmState {
        state: 3,
        behavior: 2,
        stamp_nanos: 42 * SEC,
    };
    unsafe {
        assert_eq!(motion_arbiter_restore_state(h, saved), 0);
        assert_eq!(motion_arbiter_get_state(h), saved);
        motion_arbiter_handler_free(h);
    }
}

#[test]
fn ffi_shift_predicates() {
    assert_eq!(motion_arbiter_classify_shift(0.0, 1.0, 0.1), MaShiftKind::Avoid);
    assert_eq!(motion_arbiter_classify_shift(1.0, 0.0, 0.1), MaShiftKind::Return);
    assert_eq!(motion_arbiter_classify_shift(0.5, 1.0, 0.1), MaShiftKind::LeftMiddle);
    assert_eq!(motion_arbiter_classify_shift(0.0, 0.05, 0.1), MaShiftKind::None);

    let avoid = MaShiftKind::Avoid as u8;
    assert_eq!(motion_arbiter_side_lane_exists(avoid, 1.0, 1, 0), 1);
    assert_eq!(motion_arbiter_side_lane_exists(avoid, 1.0, 0, 1), 0);
    assert_eq!(motion_arbiter_side_lane_exists(99, 1.0, 1, 1), -1);
}
