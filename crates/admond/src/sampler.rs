//! Periodic worker memory/CPU aggregation.
//!
//! Two independently reconfigurable timers drive sampling from the admin
//! event loop. Memory comes from `sysinfo` resident figures; CPU comes from
//! `procfs` jiffy counters so usage can be computed as a delta against the
//! previous tick. A pid that no longer resolves (worker exited) is skipped
//! from the aggregate; its record is cleaned up by the normal document
//! removal flow, not here.

use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Floor for sampling cadence; rescheduling below this is clamped.
pub const MIN_STATS_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Process Probe
// ============================================================================

/// Source of per-process resource figures.
///
/// Production uses [`SystemProbe`]; tests substitute a deterministic fake.
pub trait ProcessProbe: Send {
    /// Refreshes cached process tables before a round of queries.
    fn refresh(&mut self) {}

    /// Resident memory of `pid` in bytes, `None` if the process is gone.
    fn memory_bytes(&mut self, pid: u32) -> Option<u64>;

    /// Accumulated CPU time of `pid` in jiffies, `None` if the process is gone.
    fn cpu_jiffies(&mut self, pid: u32) -> Option<u64>;

    /// OS clock ticks per second, for converting jiffies to seconds.
    fn ticks_per_second(&self) -> u64;
}

/// Probe backed by `sysinfo` (memory) and `procfs` (CPU jiffies).
pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    /// Creates a probe with an empty process table; call `refresh` before
    /// querying.
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProbe {
    fn refresh(&mut self) {
        self.system.refresh_all();
    }

    fn memory_bytes(&mut self, pid: u32) -> Option<u64> {
        self.system.process(Pid::from_u32(pid)).map(|p| p.memory())
    }

    fn cpu_jiffies(&mut self, pid: u32) -> Option<u64> {
        let process = procfs::process::Process::new(pid as i32).ok()?;
        let stat = process.stat().ok()?;
        Some(stat.utime + stat.stime)
    }

    fn ticks_per_second(&self) -> u64 {
        procfs::ticks_per_second()
    }
}

// ============================================================================
// Stats Sampler
// ============================================================================

/// Aggregates worker resource usage against a rolling baseline.
///
/// The baseline starts empty at process start, so the first CPU sample is
/// zero rather than a fault.
pub struct StatsSampler {
    probe: Box<dyn ProcessProbe>,
    last_total_memory: Option<u64>,
    last_jiffies: Option<(u64, Instant)>,
}

impl StatsSampler {
    /// Creates a sampler with no baseline.
    pub fn new(probe: Box<dyn ProcessProbe>) -> Self {
        Self {
            probe,
            last_total_memory: None,
            last_jiffies: None,
        }
    }

    /// Sums resident memory across `pids`, skipping processes that no
    /// longer resolve. The result becomes the baseline reported by
    /// [`Self::last_total_memory`].
    pub fn total_memory(&mut self, pids: &[u32]) -> u64 {
        self.probe.refresh();

        let total = pids
            .iter()
            .filter_map(|&pid| self.probe.memory_bytes(pid))
            .sum();

        self.last_total_memory = Some(total);
        total
    }

    /// Aggregate CPU usage across `pids` since the previous sample, as a
    /// percentage of one core.
    ///
    /// The first call after (re)start establishes the baseline and returns
    /// zero. Exited pids contribute nothing; a shrinking jiffy sum clamps to
    /// zero rather than going negative.
    pub fn cpu_percent(&mut self, pids: &[u32], now: Instant) -> f64 {
        let jiffies: u64 = pids
            .iter()
            .filter_map(|&pid| self.probe.cpu_jiffies(pid))
            .sum();

        let previous = self.last_jiffies.replace((jiffies, now));

        let Some((last_jiffies, last_at)) = previous else {
            debug!(jiffies, "CPU baseline established");
            return 0.0;
        };

        let elapsed = now.duration_since(last_at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }

        let delta = jiffies.saturating_sub(last_jiffies) as f64;
        100.0 * delta / self.probe.ticks_per_second() as f64 / elapsed
    }

    /// Last memory aggregate, if any tick has run.
    pub fn last_total_memory(&self) -> Option<u64> {
        self.last_total_memory
    }
}

// ============================================================================
// Stats Timers
// ============================================================================

/// Which sampling timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsTick {
    Memory,
    Cpu,
}

/// The two repeating sampling timers, each reconfigurable at runtime.
///
/// Rescheduling replaces the underlying interval, so it only changes the
/// cadence of future ticks; a tick in progress is never interrupted, and the
/// first tick after (re)scheduling fires one full period later, never
/// immediately.
pub struct StatsTimers {
    mem: Interval,
    cpu: Interval,
    mem_every: Duration,
    cpu_every: Duration,
}

impl StatsTimers {
    /// Creates both timers. Must be called from within the runtime.
    pub fn new(mem_every: Duration, cpu_every: Duration) -> Self {
        let mem_every = mem_every.max(MIN_STATS_INTERVAL);
        let cpu_every = cpu_every.max(MIN_STATS_INTERVAL);
        Self {
            mem: make_interval(mem_every),
            cpu: make_interval(cpu_every),
            mem_every,
            cpu_every,
        }
    }

    /// Replaces the memory timer's cadence from the next tick onward.
    pub fn reschedule_mem(&mut self, every: Duration) {
        let every = clamp_interval(every);
        debug!(interval_ms = every.as_millis() as u64, "Memory timer rescheduled");
        self.mem_every = every;
        self.mem = make_interval(every);
    }

    /// Replaces the CPU timer's cadence from the next tick onward.
    pub fn reschedule_cpu(&mut self, every: Duration) {
        let every = clamp_interval(every);
        debug!(interval_ms = every.as_millis() as u64, "CPU timer rescheduled");
        self.cpu_every = every;
        self.cpu = make_interval(every);
    }

    /// Current memory cadence.
    pub fn mem_every(&self) -> Duration {
        self.mem_every
    }

    /// Current CPU cadence.
    pub fn cpu_every(&self) -> Duration {
        self.cpu_every
    }

    /// Waits for the next timer to fire. Memory wins ties so that
    /// coinciding deadlines produce a deterministic order.
    pub async fn tick(&mut self) -> StatsTick {
        tokio::select! {
            biased;

            _ = self.mem.tick() => StatsTick::Memory,
            _ = self.cpu.tick() => StatsTick::Cpu,
        }
    }
}

fn make_interval(every: Duration) -> Interval {
    // interval_at so the first tick lands a full period out; a plain
    // interval() fires immediately, which would double-sample on reschedule.
    let mut interval = interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn clamp_interval(every: Duration) -> Duration {
    if every < MIN_STATS_INTERVAL {
        warn!(
            requested_ms = every.as_millis() as u64,
            floor_ms = MIN_STATS_INTERVAL.as_millis() as u64,
            "Stats interval below floor, clamping"
        );
        MIN_STATS_INTERVAL
    } else {
        every
    }
}
