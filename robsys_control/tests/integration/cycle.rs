//! Scheduler tests over in-memory channels.
//!
//! Covers event replies, setpoint/measure batches, same-cycle ordering of
//! refresh and axis traffic, malformed input, and the stop flag.

use super::support::{
    axis_measure, batch_bytes, joint_measure, record_bytes, runner_with, wire_values,
};
use robsys_common::protocol::{ControlState, STATUS_FAILURE};
use robsys_common::robot::DofVariables;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const UNIT_POSITION: [f32; 7] = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

// ─── Events ─────────────────────────────────────────────────────────

#[test]
fn refresh_info_replies_with_descriptor() {
    let (mut runner, peers, _script) = runner_with("arm1");

    peers.events.send(&[0x00]).unwrap();
    runner.cycle_body();

    let reply = peers.events.recv().expect("one reply");
    assert_eq!(reply[0], 0x00);
    let json: serde_json::Value = serde_json::from_slice(&reply[1..]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": "arm1",
            "axes": ["shoulder", "elbow"],
            "joints": ["j0", "j1"],
        })
    );
    assert!(peers.events.recv().is_none());
}

#[test]
fn every_request_gets_one_reply() {
    let (mut runner, peers, _script) = runner_with("arm1");

    for op in [0x02u8, 0x06, 0x03, 0x01] {
        peers.events.send(&[op]).unwrap();
    }
    runner.cycle_body();

    let replies = peers.events.drain();
    assert_eq!(
        replies,
        vec![
            vec![ControlState::Enabled.status_code()],
            vec![ControlState::Operating.status_code()],
            vec![ControlState::Offsetting.status_code()],
            vec![ControlState::Disabled.status_code()],
        ]
    );
    assert_eq!(runner.control_state(), ControlState::Disabled);
}

#[test]
fn unknown_empty_and_set_user_get_no_reply() {
    let (mut runner, peers, script) = runner_with("arm1");

    peers.events.send(&[]).unwrap();
    peers.events.send(&[0x42, 1, 2, 3]).unwrap();
    peers.events.send(b"\x07operator").unwrap();
    peers.events.send(&[0x02]).unwrap();
    runner.cycle_body();

    // Only the enable request is answered.
    assert_eq!(peers.events.drain(), vec![vec![0x02]]);
    assert_eq!(script.lock().users, ["operator"]);
}

#[test]
fn no_controller_fails_control_and_publishes_nothing() {
    let (mut runner, peers, _script) = runner_with("ghost");
    assert!(!runner.session().is_loaded());

    for op in 0x01..=0x06u8 {
        peers.events.send(&[op]).unwrap();
    }
    peers.events.send(&[0x00]).unwrap();
    peers
        .axes
        .send(&batch_bytes(&[record_bytes(0, UNIT_POSITION)]))
        .unwrap();
    runner.cycle_body();

    let replies = peers.events.drain();
    assert_eq!(replies.len(), 7);
    assert!(replies.iter().all(|r| r.as_slice() == [STATUS_FAILURE]));
    assert_eq!(runner.control_state(), ControlState::Disabled);
    assert!(peers.axes.recv().is_none());
    assert!(peers.joints.recv().is_none());
}

// ─── Axes / Joints ──────────────────────────────────────────────────

#[test]
fn setpoint_applied_and_only_fresh_measures_published() {
    let (mut runner, peers, script) = runner_with("arm1");
    script.lock().failing_axes.push(1);

    peers
        .axes
        .send(&batch_bytes(&[record_bytes(0, UNIT_POSITION)]))
        .unwrap();
    runner.cycle_body();

    {
        let script = script.lock();
        assert_eq!(script.setpoints.len(), 1);
        let (robot, axis, values) = &script.setpoints[0];
        assert_eq!((robot.as_str(), *axis), ("arm1", 0));
        assert_eq!(
            *values,
            DofVariables {
                position: 1.0,
                ..Default::default()
            }
        );
    }

    let expected = batch_bytes(&[record_bytes(0, wire_values(&axis_measure(0)))]);
    assert_eq!(peers.axes.drain(), vec![expected]);
}

#[test]
fn joints_published_every_cycle() {
    let (mut runner, peers, _script) = runner_with("arm1");

    // Inbound joint traffic is drained and ignored.
    peers.joints.send(&[0xFF; 8]).unwrap();
    runner.cycle_body();
    runner.cycle_body();

    let expected = batch_bytes(&[
        record_bytes(0, wire_values(&joint_measure(0))),
        record_bytes(1, wire_values(&joint_measure(1))),
    ]);
    assert_eq!(peers.joints.drain(), vec![expected.clone(), expected]);
}

#[test]
fn out_of_range_and_malformed_batches_discarded() {
    let (mut runner, peers, script) = runner_with("arm1");

    // Truncated: declares two records, carries one.
    let mut truncated = batch_bytes(&[record_bytes(0, UNIT_POSITION)]);
    truncated[0] = 2;
    peers.axes.send(&truncated).unwrap();
    // Count beyond capacity.
    peers.axes.send(&[200]).unwrap();
    // Index 5 does not exist; index 1 does.
    peers
        .axes
        .send(&batch_bytes(&[
            record_bytes(5, UNIT_POSITION),
            record_bytes(1, UNIT_POSITION),
        ]))
        .unwrap();
    runner.cycle_body();

    let script = script.lock();
    let axes: Vec<_> = script.setpoints.iter().map(|(_, axis, _)| *axis).collect();
    assert_eq!(axes, [1]);
}

#[test]
fn non_finite_setpoint_batch_discarded() {
    let (mut runner, peers, script) = runner_with("arm1");

    let mut nan_position = UNIT_POSITION;
    nan_position[0] = f32::NAN;
    let mut inf_damping = UNIT_POSITION;
    inf_damping[6] = f32::INFINITY;

    // A poisoned record takes its whole batch with it.
    peers
        .axes
        .send(&batch_bytes(&[
            record_bytes(1, UNIT_POSITION),
            record_bytes(0, nan_position),
        ]))
        .unwrap();
    peers
        .axes
        .send(&batch_bytes(&[record_bytes(1, inf_damping)]))
        .unwrap();
    runner.cycle_body();
    assert!(script.lock().setpoints.is_empty());

    peers
        .axes
        .send(&batch_bytes(&[record_bytes(0, UNIT_POSITION)]))
        .unwrap();
    runner.cycle_body();

    let script = script.lock();
    assert_eq!(script.setpoints.len(), 1);
    let (_, axis, values) = &script.setpoints[0];
    assert_eq!(*axis, 0);
    assert_eq!(values.position, 1.0);
    assert!(values.to_array().iter().all(|v| v.is_finite()));
}

#[test]
fn session_positions_skip_unresolved_axes() {
    let (mut runner, peers, script) = runner_with("gappy");
    assert_eq!(runner.session().omitted_axes(), &[1]);

    peers
        .axes
        .send(&batch_bytes(&[record_bytes(1, UNIT_POSITION)]))
        .unwrap();
    runner.cycle_body();

    // Session position 1 drives controller axis 2.
    assert_eq!(script.lock().setpoints[0].1, 2);

    let expected = batch_bytes(&[
        record_bytes(0, wire_values(&axis_measure(0))),
        record_bytes(1, wire_values(&axis_measure(2))),
    ]);
    assert_eq!(peers.axes.drain(), vec![expected]);
}

// ─── Ordering ───────────────────────────────────────────────────────

#[test]
fn refresh_is_visible_to_axes_in_same_cycle() {
    let (mut runner, peers, script) = runner_with("mono");

    // Axis 1 does not exist before the swap.
    peers.events.send(b"\x00arm1").unwrap();
    peers
        .axes
        .send(&batch_bytes(&[record_bytes(1, UNIT_POSITION)]))
        .unwrap();
    runner.cycle_body();

    let script = script.lock();
    assert_eq!(script.shutdowns, ["mono"]);
    assert_eq!(script.setpoints.len(), 1);
    assert_eq!(script.setpoints[0].0, "arm1");
    assert_eq!(script.setpoints[0].1, 1);

    let reply = peers.events.recv().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&reply[1..]).unwrap();
    assert_eq!(json["id"], "arm1");

    // Two axes measured after the swap.
    assert_eq!(peers.axes.recv().unwrap()[0], 2);
}

#[test]
fn shrinking_swap_discards_stale_indices() {
    let (mut runner, peers, script) = runner_with("arm1");

    peers.events.send(b"\x00mono").unwrap();
    peers
        .axes
        .send(&batch_bytes(&[record_bytes(1, UNIT_POSITION)]))
        .unwrap();
    runner.cycle_body();

    assert!(script.lock().setpoints.is_empty());
    assert_eq!(runner.session().axis_count(), 1);
}

// ─── Lifecycle ──────────────────────────────────────────────────────

#[test]
fn shutdown_closes_channels_and_ends_session() {
    let (mut runner, peers, script) = runner_with("arm1");

    runner.shutdown();

    assert!(peers.events.is_closed());
    assert!(peers.axes.is_closed());
    assert!(peers.joints.is_closed());
    assert!(!runner.session().is_loaded());
    assert_eq!(script.lock().shutdowns, ["arm1"]);
}

#[test]
fn run_stops_on_cleared_flag() {
    use robsys_control::cycle::{Channels, CycleRunner};
    use robsys_control::datalog::TracingDataLog;
    use robsys_control::transport::MemoryChannel;

    let script = super::support::SharedScript::default();
    let mut session = super::support::scripted_session(&script);
    session.refresh(Some("arm1"));

    let (events, _events_peer) = MemoryChannel::pair();
    let (axes, axes_peer) = MemoryChannel::pair();
    let (joints, _joints_peer) = MemoryChannel::pair();
    let running = Arc::new(AtomicBool::new(true));

    let mut runner = CycleRunner::new(
        session,
        Channels {
            events: Box::new(events),
            axes: Box::new(axes),
            joints: Box::new(joints),
        },
        Box::new(TracingDataLog::new("logs")),
        Duration::from_millis(1),
        Arc::clone(&running),
    );

    let stopper = {
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            running.store(false, Ordering::SeqCst);
        })
    };
    runner.run().unwrap();
    stopper.join().unwrap();

    let cycles = runner.stats().cycle_count;
    assert!(cycles > 0);
    // One axes batch per cycle.
    assert_eq!(axes_peer.drain().len() as u64, cycles);
}
