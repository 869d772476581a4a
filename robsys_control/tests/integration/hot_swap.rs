//! Hot-swap against a real configuration directory.
//!
//! Uses the built-in registry and the simulated robot, loading
//! `robots/<name>.toml` from a temporary directory.

use robsys_control::cycle::{Channels, CycleRunner};
use robsys_control::datalog::TracingDataLog;
use robsys_control::registry::RobotRegistry;
use robsys_control::session::Session;
use robsys_control::transport::MemoryChannel;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

fn write_robot(dir: &Path, name: &str, content: &str) {
    let robots = dir.join("robots");
    fs::create_dir_all(&robots).unwrap();
    fs::write(robots.join(format!("{name}.toml")), content).unwrap();
}

fn config_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_robot(
        dir.path(),
        "arm1",
        r#"
kind = "simulation"

[[axes]]
name = "shoulder"
tracking_gain = 1.0

[[axes]]
name = "elbow"
tracking_gain = 1.0

[[joints]]
name = "j0"
axis = 0

[[joints]]
name = "j1"
axis = 1
ratio = 2.0
"#,
    );
    write_robot(
        dir.path(),
        "partial",
        r#"
kind = "simulation"

[[axes]]
name = "base"

[[axes]]

[[axes]]
name = "tool"

[[joints]]
axis = 0
"#,
    );
    write_robot(dir.path(), "alien", "kind = \"ethercat\"\n");
    dir
}

fn session(dir: &TempDir) -> Session {
    Session::new(Box::new(RobotRegistry::with_builtin_robots(dir.path())))
}

// ─── Session ────────────────────────────────────────────────────────

#[test]
fn refresh_loads_descriptor_from_config() {
    let dir = config_dir();
    let mut session = session(&dir);

    let descriptor = session.refresh(Some("arm1")).cloned().unwrap();
    assert_eq!(descriptor.id, "arm1");
    assert_eq!(descriptor.axes, ["shoulder", "elbow"]);
    assert_eq!(descriptor.joints, ["j0", "j1"]);
    assert_eq!(session.axis_count(), 2);
    assert_eq!(session.joint_count(), 2);
}

#[test]
fn handle_lists_match_descriptor_after_omissions() {
    let dir = config_dir();
    let mut session = session(&dir);

    let descriptor = session.refresh(Some("partial")).cloned().unwrap();
    assert_eq!(descriptor.axes, ["base", "tool"]);
    assert!(descriptor.joints.is_empty());
    assert_eq!(session.axis_count(), descriptor.axes.len());
    assert_eq!(session.joint_count(), descriptor.joints.len());
    assert_eq!(session.omitted_axes(), &[1]);
    assert_eq!(session.omitted_joints(), &[0]);
}

#[test]
fn unresolvable_names_leave_session_empty() {
    let dir = config_dir();
    let mut session = session(&dir);

    for name in ["ghost", "alien", "../arm1"] {
        session.refresh(Some("arm1"));
        assert!(session.refresh(Some(name)).is_none(), "{name}");
        assert!(!session.is_loaded());
        assert_eq!(session.axis_count(), 0);
        assert!(session.descriptor_bytes().is_empty());
    }
}

#[test]
fn simulated_axis_tracks_setpoint_through_session() {
    let dir = config_dir();
    let mut session = session(&dir);
    session.refresh(Some("arm1"));

    let target = robsys_common::robot::DofVariables {
        position: 0.75,
        ..Default::default()
    };
    session.set_axis_setpoints(1, &target).unwrap();

    // Gain 1.0 converges in one read; joint 1 doubles axis 1.
    assert_eq!(session.axis_measures(1).unwrap().position, 0.75);
    assert_eq!(session.joint_measures(1).unwrap().position, 1.5);
    assert_eq!(session.axis_measures(0).unwrap().position, 0.0);
}

#[test]
fn simulated_axis_survives_non_finite_setpoint() {
    let dir = config_dir();
    let mut session = session(&dir);
    session.refresh(Some("arm1"));

    let (axes, axes_peer) = MemoryChannel::pair();
    let (events, _events_peer) = MemoryChannel::pair();
    let (joints, joints_peer) = MemoryChannel::pair();
    let mut runner = CycleRunner::new(
        session,
        Channels {
            events: Box::new(events),
            axes: Box::new(axes),
            joints: Box::new(joints),
        },
        Box::new(TracingDataLog::new(dir.path().join("logs"))),
        Duration::from_millis(5),
        Arc::new(AtomicBool::new(true)),
    );

    let batch = |position: f32| {
        let mut bytes = vec![1u8, 0];
        bytes.extend_from_slice(&position.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 24]);
        bytes
    };

    axes_peer.send(&batch(f32::NAN)).unwrap();
    runner.cycle_body();
    axes_peer.send(&batch(1.0)).unwrap();
    runner.cycle_body();

    // Gain 1.0: axis 0 sits at the valid setpoint, joint 0 follows it.
    let measured = runner.session_mut().axis_measures(0).unwrap();
    assert_eq!(measured.position, 1.0);
    assert!(measured.to_array().iter().all(|v| v.is_finite()));

    for bytes in axes_peer.drain().iter().chain(&joints_peer.drain()) {
        let published = robsys_control::codec::decode_batch(bytes).unwrap();
        assert!(published.iter().all(|r| r.is_finite()));
    }
}

// ─── Over the events channel ────────────────────────────────────────

#[test]
fn hot_swap_over_events_channel() {
    let dir = config_dir();
    let mut session = session(&dir);
    session.refresh(Some("partial"));

    let (events, events_peer) = MemoryChannel::pair();
    let (axes, axes_peer) = MemoryChannel::pair();
    let (joints, _joints_peer) = MemoryChannel::pair();
    let mut runner = CycleRunner::new(
        session,
        Channels {
            events: Box::new(events),
            axes: Box::new(axes),
            joints: Box::new(joints),
        },
        Box::new(TracingDataLog::new(dir.path().join("logs"))),
        Duration::from_millis(5),
        Arc::new(AtomicBool::new(true)),
    );

    events_peer.send(&[0x02]).unwrap();
    events_peer.send(b"\x00arm1").unwrap();
    runner.cycle_body();

    let replies = events_peer.drain();
    assert_eq!(replies[0], [0x02]);
    let json: serde_json::Value = serde_json::from_slice(&replies[1][1..]).unwrap();
    assert_eq!(json["id"], "arm1");
    assert_eq!(json["joints"], serde_json::json!(["j0", "j1"]));
    assert_eq!(
        runner.control_state(),
        robsys_common::protocol::ControlState::Disabled
    );

    // Axes batch already reflects both new axes.
    assert_eq!(axes_peer.recv().unwrap()[0], 2);

    events_peer.send(b"\x00ghost").unwrap();
    runner.cycle_body();
    assert_eq!(events_peer.recv().unwrap(), [0x00]);
    assert!(axes_peer.recv().is_none());
}
