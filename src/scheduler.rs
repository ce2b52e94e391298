use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::models::{CycleResult, CycleStatus, RoleOutcome, RoleQuery};

/// Runs the whole pipeline for one role.
pub trait RoleRunner {
    fn run_role(&mut self, role: &RoleQuery) -> Result<RoleOutcome>;
}

impl<F> RoleRunner for F
where
    F: FnMut(&RoleQuery) -> Result<RoleOutcome>,
{
    fn run_role(&mut self, role: &RoleQuery) -> Result<RoleOutcome> {
        self(role)
    }
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<F> Sleeper for F
where
    F: FnMut(Duration),
{
    fn sleep(&mut self, duration: Duration) {
        self(duration)
    }
}

/// Cooperative stop request, honoured between cycles only.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "role runner panicked".to_string()
    }
}

pub struct Scheduler<R: RoleRunner, S: Sleeper = ThreadSleeper> {
    roles: Vec<RoleQuery>,
    runner: R,
    sleeper: S,
    interval: Duration,
    stop: StopHandle,
}

impl<R: RoleRunner> Scheduler<R, ThreadSleeper> {
    pub fn new(roles: Vec<RoleQuery>, runner: R, interval: Duration) -> Self {
        Self::with_sleeper(roles, runner, interval, ThreadSleeper)
    }
}

impl<R: RoleRunner, S: Sleeper> Scheduler<R, S> {
    pub fn with_sleeper(roles: Vec<RoleQuery>, runner: R, interval: Duration, sleeper: S) -> Self {
        Self {
            roles,
            runner,
            sleeper,
            interval,
            stop: StopHandle::new(),
        }
    }

    /// Share an existing stop flag instead of the scheduler's own.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// One pass over the enabled roles, in configured order. A failing or
    /// panicking role is recorded and the next role still runs.
    pub fn run_cycle(&mut self) -> Vec<CycleResult> {
        let enabled: Vec<RoleQuery> = self.roles.iter().filter(|r| r.enabled).cloned().collect();
        if enabled.is_empty() {
            info!("no enabled roles; nothing to do this cycle");
            return Vec::new();
        }

        let total = enabled.len();
        let mut results = Vec::with_capacity(total);
        for (i, role) in enabled.iter().enumerate() {
            info!("[ROLE {}/{}] {}", i + 1, total, role.title);
            let runner = &mut self.runner;
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| runner.run_role(role)));
            let result = match attempt {
                Ok(Ok(outcome)) => CycleResult::ok(&role.title, outcome),
                Ok(Err(err)) => {
                    error!(role = %role.title, error = %format!("{:#}", err), "role failed");
                    CycleResult::error(&role.title, format!("{:#}", err))
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!(role = %role.title, panic = %msg, "role runner panicked");
                    CycleResult::error(&role.title, format!("panic: {}", msg))
                }
            };
            results.push(result);
        }
        results
    }

    /// Run cycles until stopped or `max_cycles` is reached, sleeping so that
    /// cycles start `interval` apart. Each cycle's results go to `on_cycle`
    /// as soon as it ends; nothing is retained. `Some(0)` runs no cycles.
    /// Returns the number of cycles run.
    pub fn run<F>(&mut self, max_cycles: Option<u32>, mut on_cycle: F) -> u32
    where
        F: FnMut(u32, &[CycleResult]),
    {
        let mut cycle = 0u32;

        while !self.stop.is_stopped() && max_cycles.is_none_or(|max| cycle < max) {
            cycle += 1;
            let started = Instant::now();
            info!(cycle, "starting cycle");

            let results = self.run_cycle();
            let failed = results.iter().filter(|r| r.status == CycleStatus::Error).count();
            info!(cycle, roles = results.len(), failed, elapsed = ?started.elapsed(), "cycle finished");
            on_cycle(cycle, &results);

            if max_cycles.is_some_and(|max| cycle >= max) || self.stop.is_stopped() {
                break;
            }
            let wait = self.interval.saturating_sub(started.elapsed());
            info!(wait_secs = wait.as_secs(), "sleeping until next cycle");
            self.sleeper.sleep(wait);
        }

        cycle
    }
}
