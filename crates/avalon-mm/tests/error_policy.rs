//! Response errors, expectation mismatches and fatal conditions.

#![allow(clippy::pedantic, clippy::nursery, clippy::too_many_lines)]

mod common;

use avalon_mm::{
    AvalonBus, AvalonError, BeatKind, ErrorClass, MasterConfig, ReadRequest, ResponseCode, Signal,
    TimeoutPhase, WriteRequest,
};
use common::{harness, EchoResponder};
use log as _;
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

/// Word 0x400 (byte 0x1000) answers SLVERR.
fn faulty() -> EchoResponder {
    EchoResponder::new(32).with_error_words(0x400..=0x400)
}

#[rstest]
#[case::unexpected_error_raises(true, false, true, Some(ErrorClass::Protocol), false)]
#[case::expected_error_completes(true, true, true, None, false)]
#[case::suppressed_error_sets_flag(true, false, false, None, true)]
#[case::missing_error_raises(false, true, true, Some(ErrorClass::Protocol), false)]
#[case::missing_error_suppressed(false, true, false, None, true)]
#[case::expected_error_suppressed(true, true, false, None, false)]
#[case::clean_write(false, false, true, None, false)]
fn write_error_policy(
    #[case] error_response: bool,
    #[case] error_expected: bool,
    #[case] exception_enabled: bool,
    #[case] raised: Option<ErrorClass>,
    #[case] occurred: bool,
) {
    let config = MasterConfig::default().with_exception_enabled(exception_enabled);
    let mut master = harness(&config, faulty());
    let address = if error_response { 0x1000 } else { 0x2000 };
    let mut request = WriteRequest::new(address, 0xAB_u32);
    if error_expected {
        request = request.expect_error();
    }

    let result = master.write(&request);
    assert_eq!(result.as_ref().err().map(AvalonError::class), raised);
    assert_eq!(master.exception_occurred(), occurred);
    assert!(master.fault().is_none());
}

#[test]
fn unexpected_error_names_the_failing_beat() {
    let mut master = harness(
        &MasterConfig::default(),
        EchoResponder::new(32).with_error_words(0x401..=0x401),
    );
    let err = master
        .write(&WriteRequest::new(0x1000, vec![0; 12]))
        .expect_err("second beat fails");
    assert_eq!(
        err,
        AvalonError::ResponseError {
            kind: BeatKind::Write,
            byte_address: 0x1000,
            word_address: 0x401,
            response: ResponseCode::SlaveError,
        }
    );
    assert!(err.to_string().contains("SLVERR"));
    assert_eq!(master.clock().accepted.len(), 3, "all beats still run");
}

#[test]
fn read_error_skips_data_comparison() {
    let mut master = harness(&MasterConfig::default(), faulty());
    let data = master
        .read(
            &ReadRequest::new(0x1000)
                .with_expected(0xDEAD_BEEF_u32)
                .expect_error(),
        )
        .expect("error was expected");
    assert_eq!(data, vec![0; 4]);

    let err = master
        .read(&ReadRequest::new(0x1000))
        .expect_err("unexpected SLVERR");
    assert_eq!(err.class(), ErrorClass::Protocol);
}

#[test]
fn data_mismatch_is_raised_with_both_values() {
    let mut responder = EchoResponder::new(32);
    responder.poke(0x100, &[1, 2, 3, 4]);
    let mut master = harness(&MasterConfig::default(), responder);

    let data = master
        .read(&ReadRequest::new(0x100).with_expected(0x0403_0201_u32))
        .expect("data matches");
    assert_eq!(data, vec![1, 2, 3, 4]);

    let err = master
        .read(&ReadRequest::new(0x100).with_expected(0xDEAD_BEEF_u32))
        .expect_err("data differs");
    assert_eq!(
        err,
        AvalonError::DataMismatch {
            byte_address: 0x100,
            expected: vec![0xEF, 0xBE, 0xAD, 0xDE],
            actual: vec![1, 2, 3, 4],
        }
    );
    assert!(err
        .to_string()
        .contains("expected 0xdeadbeef doesn't match returned 0x04030201"));
}

#[test]
fn suppressed_mismatch_returns_data_and_sets_flag() {
    let mut responder = EchoResponder::new(32);
    responder.poke(0x100, &[1, 2, 3, 4]);
    let config = MasterConfig::default().with_exception_enabled(false);
    let mut master = harness(&config, responder);

    let data = master
        .read(&ReadRequest::new(0x100).with_expected(0xDEAD_BEEF_u32))
        .expect("suppressed");
    assert_eq!(data, vec![1, 2, 3, 4]);
    assert!(master.exception_occurred());
}

#[test]
fn occurred_flag_tracks_the_last_completion() {
    let config = MasterConfig::default().with_exception_enabled(false);
    let mut master = harness(&config, faulty());

    master
        .write(&WriteRequest::new(0x1000, 1_u32))
        .expect("suppressed");
    assert!(master.exception_occurred());

    master
        .write(&WriteRequest::new(0x2000, 1_u32))
        .expect("clean");
    assert!(!master.exception_occurred());
}

#[test]
fn policy_is_read_at_completion_time() {
    let mut master = harness(&MasterConfig::default(), faulty());
    let handle = master
        .write_nowait(&WriteRequest::new(0x1000, 1_u32))
        .expect("valid request");
    master.set_exception_enabled(false);
    assert_eq!(master.join(handle), Ok(Vec::new()));
    assert!(master.exception_occurred());

    let handle = master
        .write_nowait(&WriteRequest::new(0x1000, 1_u32))
        .expect("valid request");
    master.set_exception_enabled(true);
    assert!(master.join(handle).is_err());
    assert!(master.exception_occurred(), "raised outcomes leave the flag");
}

#[test]
fn wait_reports_the_first_undelivered_error_once() {
    let mut master = harness(&MasterConfig::default(), faulty());
    master
        .write_nowait(&WriteRequest::new(0x2000, 1_u32))
        .expect("valid request");
    master
        .write_nowait(&WriteRequest::new(0x1000, 2_u32))
        .expect("valid request");
    master
        .write_nowait(&WriteRequest::new(0x1000, 3_u32).expect_error())
        .expect("valid request");

    let err = master.wait().expect_err("second write failed");
    assert!(matches!(
        err,
        AvalonError::ResponseError {
            byte_address: 0x1000,
            ..
        }
    ));
    assert_eq!(master.completed_transactions(), 0);
    assert_eq!(master.wait(), Ok(()));
}

#[test]
fn error_reported_by_wait_is_not_joined_again() {
    let mut master = harness(&MasterConfig::default(), faulty());
    let failing = master
        .read_nowait(&ReadRequest::new(0x1000))
        .expect("valid request");
    let clean = master
        .read_nowait(&ReadRequest::new(0x2000))
        .expect("valid request");

    let err = master.wait().expect_err("SLVERR on the first read");
    assert_eq!(err.class(), ErrorClass::Protocol);
    assert_eq!(master.completed_transactions(), 1);
    assert_eq!(
        master.join(failing),
        Err(AvalonError::UnknownTransaction { id: failing.id() })
    );
    assert_eq!(master.join(clean), Ok(vec![0; 4]));
}

#[rstest]
fn response_timeout_is_fatal_under_any_policy(#[values(true, false)] exception_enabled: bool) {
    let config = MasterConfig::default()
        .with_timeout_cycles(5)
        .with_exception_enabled(exception_enabled);
    let mut master = harness(&config, EchoResponder::new(32).silent());

    let err = master
        .read(&ReadRequest::new(0x1000))
        .expect_err("responder never answers");
    assert_eq!(
        err,
        AvalonError::Timeout {
            kind: BeatKind::Read,
            phase: TimeoutPhase::Response,
            byte_address: 0x1000,
            word_address: 0x400,
            cycles: 5,
        }
    );
    assert!(err.is_fatal());
    // accepted on edge 1, expired on edge 6
    assert_eq!(master.cycle(), 6);
    assert_eq!(master.fault(), Some(&err));
    assert_eq!(master.write(&WriteRequest::new(0, 1_u32)), Err(err.clone()));
    assert_eq!(master.wait(), Err(err));
    assert_eq!(master.cycle(), 6);
}

#[rstest]
#[case::answer_on_last_edge(5, 5, true)]
#[case::answer_one_edge_late(6, 5, false)]
#[case::zero_budget_allows_next_edge(1, 0, true)]
#[case::zero_budget_expires(2, 0, false)]
fn response_budget_boundary(#[case] latency: u64, #[case] budget: i64, #[case] completes: bool) {
    let config = MasterConfig::default().with_timeout_cycles(budget);
    let mut master = harness(&config, EchoResponder::new(32).with_latency(latency, latency));
    let result = master.write(&WriteRequest::new(0x0, 1_u32));
    assert_eq!(result.is_ok(), completes, "{result:?}");
}

#[rstest]
fn acceptance_timeout_is_fatal(#[values(true, false)] exception_enabled: bool) {
    let config = MasterConfig::default()
        .with_timeout_cycles(5)
        .with_exception_enabled(exception_enabled);
    let mut master = harness(&config, EchoResponder::new(32).with_stall(u32::MAX));

    let err = master
        .write(&WriteRequest::new(0x44, 1_u32))
        .expect_err("waitrequest never drops");
    assert_eq!(
        err,
        AvalonError::Timeout {
            kind: BeatKind::Write,
            phase: TimeoutPhase::Acceptance,
            byte_address: 0x44,
            word_address: 0x11,
            cycles: 5,
        }
    );
    // first held edge is free, the budget runs out on edge 6
    assert_eq!(master.cycle(), 6);
    assert!(master.clock().accepted.is_empty());
}

#[rstest]
#[case::below_budget(4, vec![5])]
#[case::at_budget(5, vec![6])]
fn stall_within_budget_is_accepted(#[case] stall: u32, #[case] accepted_at: Vec<u64>) {
    let config = MasterConfig::default().with_timeout_cycles(5);
    let mut master = harness(&config, EchoResponder::new(32).with_stall(stall));
    master
        .write(&WriteRequest::new(0x0, 1_u32))
        .expect("accepted before the budget runs out");
    assert_eq!(master.clock().request_cycles(), accepted_at);
}

#[test]
fn disabled_timeout_waits_forever() {
    let config = MasterConfig::default().with_timeout_cycles(-1);
    let mut master = harness(&config, EchoResponder::new(32).silent());
    let handle = master
        .read_nowait(&ReadRequest::new(0x0))
        .expect("valid request");

    master.step_cycles(5_000).expect("no timeout");
    assert_eq!(master.outstanding_beats(), 1);
    assert!(!master.is_idle());
    assert!(master.fault().is_none());

    // a late answer still completes the read
    master.bus_mut().drive(Signal::ReadData, &[9, 8, 7, 6]);
    master.bus_mut().drive_u64(Signal::ReadDataValid, 1);
    assert_eq!(master.join(handle), Ok(vec![9, 8, 7, 6]));
}

#[test]
fn unmatched_response_is_a_protocol_violation() {
    let mut master = harness(&MasterConfig::default(), EchoResponder::new(32));
    master.bus_mut().drive_u64(Signal::WriteResponseValid, 1);

    let err = master.step().expect_err("nothing outstanding");
    assert_eq!(
        err,
        AvalonError::ProtocolViolation {
            kind: BeatKind::Write,
            cycle: 1,
        }
    );
    assert_eq!(err.class(), ErrorClass::ProtocolViolation);
    assert_eq!(master.read(&ReadRequest::new(0)), Err(err));
}
