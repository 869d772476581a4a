//! Cyclic scheduler: events → axes → joints → idle, once per period.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`, lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`, pin to one CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)`, RT priority.
//!
//! All steps are no-ops without the `rt` feature.
//!
//! ## Cycle Body
//! - **events**: drain, apply each opcode, reply once per request.
//! - **axes**: drain setpoint batches into the session, then publish one
//!   batch of fresh axis measures.
//! - **joints**: drain and discard, then publish one batch of fresh joint
//!   measures.
//!
//! A refresh handled in the events phase is visible to the axes and joints
//! phases of the same cycle. An overrun is counted and logged; the next
//! cycle starts immediately and no cycle is skipped.

use crate::codec::{BatchWriter, DofRecord, decode_batch};
use crate::control::ControlStateMachine;
use crate::datalog::DataLog;
use crate::error::SystemError;
use crate::session::Session;
use crate::transport::Channel;
use robsys_common::protocol::ControlState;
use robsys_common::robot::DofVariables;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound of messages drained from one channel per cycle.
pub const MAX_DRAIN_PER_CYCLE: usize = 256;

/// Minimum interval between two overrun warnings.
const OVERRUN_WARN_INTERVAL: Duration = Duration::from_secs(1);

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: u64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: u64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: u64,
    /// Running sum for average computation.
    pub sum_cycle_ns: u128,
    /// Number of cycles that exceeded the period.
    pub overruns: u64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: u64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: u64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += u128::from(duration_ns);
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            (self.sum_cycle_ns / u128::from(self.cycle_count)) as u64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), SystemError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| SystemError::RtSetup(format!("mlockall failed: {e}")))
}

/// Touch stack pages so the loop does not fault them in later.
#[cfg(feature = "rt")]
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusively borrowed stack location.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), SystemError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| SystemError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| SystemError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), SystemError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(SystemError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

/// Perform the full RT setup sequence.
///
/// Must be called before entering the cycle loop.
#[cfg(feature = "rt")]
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), SystemError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    info!("RT setup done: cpu {}, SCHED_FIFO {}", cpu_core, rt_priority);
    Ok(())
}

/// Perform the full RT setup sequence (no-op without the `rt` feature).
#[cfg(not(feature = "rt"))]
pub fn rt_setup(_cpu_core: usize, _rt_priority: i32) -> Result<(), SystemError> {
    debug!("RT setup skipped (rt feature disabled)");
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// The three channels serviced every cycle.
pub struct Channels {
    /// Reliable request/reply channel carrying opcodes.
    pub events: Box<dyn Channel>,
    /// Datagram request/reply channel carrying axis batches.
    pub axes: Box<dyn Channel>,
    /// Datagram publish channel carrying joint batches.
    pub joints: Box<dyn Channel>,
}

/// Owns the session, the control state and the channels, and runs the loop.
pub struct CycleRunner {
    session: Session,
    control: ControlStateMachine,
    channels: Channels,
    datalog: Box<dyn DataLog>,
    stats: CycleStats,
    cycle_time: Duration,
    running: Arc<AtomicBool>,
    last_overrun_warn: Option<Instant>,
}

impl CycleRunner {
    /// Create a runner. The loop stops once `running` is cleared.
    pub fn new(
        session: Session,
        channels: Channels,
        datalog: Box<dyn DataLog>,
        cycle_time: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session,
            control: ControlStateMachine::new(),
            channels,
            datalog,
            stats: CycleStats::new(),
            cycle_time,
            running,
            last_overrun_warn: None,
        }
    }

    /// Robot session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable robot session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Current control state.
    pub fn control_state(&self) -> ControlState {
        self.control.state()
    }

    /// Timing statistics.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run cycles until the stop flag is cleared.
    ///
    /// # Errors
    /// Only clock failures in RT mode; channel and robot faults are absorbed.
    pub fn run(&mut self) -> Result<(), SystemError> {
        info!("Cycle loop started, period {:?}", self.cycle_time);

        #[cfg(feature = "rt")]
        self.run_rt_loop()?;

        #[cfg(not(feature = "rt"))]
        self.run_sim_loop();

        info!(
            "Cycle loop stopped after {} cycles (avg {} ns, max {} ns, {} overruns)",
            self.stats.cycle_count,
            self.stats.avg_cycle_ns(),
            self.stats.max_cycle_ns,
            self.stats.overruns
        );
        Ok(())
    }

    /// RT cycle loop using `clock_nanosleep(TIMER_ABSTIME)`.
    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self) -> Result<(), SystemError> {
        use nix::sys::time::TimeSpec;
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = || {
            clock_gettime(clock).map_err(|e| SystemError::RtSetup(format!("clock_gettime: {e}")))
        };
        let period = TimeSpec::from_duration(self.cycle_time);
        let mut next_wake = now()?;

        while self.running.load(Ordering::Relaxed) {
            next_wake = next_wake + period;
            let start = now()?;

            self.cycle_body();

            let end = now()?;
            let elapsed = Duration::from(end - start);
            self.finish_cycle(elapsed);

            if end >= next_wake {
                // Behind schedule: start the next cycle now, re-anchored.
                next_wake = end;
                continue;
            }
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    /// Simulation cycle loop using `std::thread::sleep`.
    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            let start = Instant::now();

            self.cycle_body();

            let elapsed = start.elapsed();
            self.finish_cycle(elapsed);

            if let Some(remaining) = self.cycle_time.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }

    fn finish_cycle(&mut self, elapsed: Duration) {
        self.stats.record(elapsed.as_nanos() as u64);
        if elapsed <= self.cycle_time {
            return;
        }

        self.stats.overruns += 1;
        let now = Instant::now();
        let due = self
            .last_overrun_warn
            .is_none_or(|last| now.duration_since(last) >= OVERRUN_WARN_INTERVAL);
        if due {
            warn!(
                "Cycle overrun: {:?} > {:?} ({} total)",
                elapsed, self.cycle_time, self.stats.overruns
            );
            self.last_overrun_warn = Some(now);
        }
    }

    /// One full cycle without the idle phase.
    pub fn cycle_body(&mut self) {
        self.service_events();
        self.service_axes();
        self.service_joints();
    }

    /// Drain the events channel and reply to each request.
    pub fn service_events(&mut self) {
        for _ in 0..MAX_DRAIN_PER_CYCLE {
            let Some(message) = self.channels.events.try_read() else {
                return;
            };
            let Some((&opcode, payload)) = message.split_first() else {
                debug!("Discarding empty event message");
                continue;
            };

            let Some(reply) = self.control.apply(
                opcode,
                payload,
                &mut self.session,
                self.datalog.as_mut(),
            ) else {
                continue;
            };
            if let Err(e) = self.channels.events.write(&reply) {
                warn!("Failed to reply to opcode 0x{:02x}: {}", opcode, e);
            }
        }
        debug!("Events drain limit reached, continuing next cycle");
    }

    /// Apply inbound setpoint batches, then publish axis measures.
    pub fn service_axes(&mut self) {
        for _ in 0..MAX_DRAIN_PER_CYCLE {
            let Some(message) = self.channels.axes.try_read() else {
                break;
            };
            let batch = match decode_batch(&message) {
                Ok(batch) => batch,
                Err(e) => {
                    debug!("Discarding axes message: {}", e);
                    continue;
                }
            };

            for record in &batch {
                let index = usize::from(record.index);
                if index >= self.session.axis_count() {
                    debug!(
                        "Discarding setpoint for axis {} ({} axes)",
                        index,
                        self.session.axis_count()
                    );
                    continue;
                }
                if let Err(e) = self
                    .session
                    .set_axis_setpoints(index, &record.to_variables())
                {
                    debug!("Axis {} setpoint not applied: {}", index, e);
                }
            }
        }

        let count = self.session.axis_count();
        publish(self.channels.axes.as_mut(), "axes", count, |index| {
            self.session.axis_measures(index)
        });
    }

    /// Drain the joints channel, then publish joint measures.
    pub fn service_joints(&mut self) {
        for _ in 0..MAX_DRAIN_PER_CYCLE {
            let Some(message) = self.channels.joints.try_read() else {
                break;
            };
            debug!("Ignoring {} inbound bytes on joints channel", message.len());
        }

        let count = self.session.joint_count();
        publish(self.channels.joints.as_mut(), "joints", count, |index| {
            self.session.joint_measures(index)
        });
    }

    /// Close every channel and tear down the robot.
    pub fn shutdown(&mut self) {
        self.channels.events.close();
        self.channels.axes.close();
        self.channels.joints.close();
        self.session.end();
        info!("Control core shut down");
    }
}

/// Encode every successful read into one batch and write it if non-empty.
fn publish(
    channel: &mut dyn Channel,
    label: &str,
    count: usize,
    mut read: impl FnMut(usize) -> Option<DofVariables>,
) {
    let mut writer = BatchWriter::new();
    for index in 0..count {
        let Some(measures) = read(index) else {
            continue;
        };
        let Ok(index_byte) = u8::try_from(index) else {
            break;
        };
        if writer
            .push(&DofRecord::from_variables(index_byte, &measures))
            .is_err()
        {
            break;
        }
    }

    if writer.is_empty() {
        return;
    }
    if let Err(e) = channel.write(writer.as_bytes()) {
        debug!("Failed to publish {} batch: {}", label, e);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
