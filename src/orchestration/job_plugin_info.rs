//! # Job Progress Aggregator
//!
//! Counters shared by every worker of one job.
//!
//! ## Overview
//!
//! Objects move `waiting → being_processed → success | failure` and never back.
//! All counters sit behind one short-lived lock so every snapshot satisfies
//! `success + failure + waiting + being_processed == total`, and increments from
//! concurrent workers are never lost.
//!
//! Multi-step jobs additionally track step progress: each enabled step weighs
//! `1 / enabled_steps` of the completion percentage.

use crate::models::{JobStats, PluginState};
use parking_lot::Mutex;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    total: usize,
    waiting: usize,
    being_processed: usize,
    success: usize,
    failure: usize,
    total_steps: usize,
    completed_steps: usize,
    step_objects: usize,
    step_objects_done: usize,
}

impl Progress {
    /// Take one object out of flight, falling back to the waiting pool
    fn take_one(&mut self) -> bool {
        if self.being_processed > 0 {
            self.being_processed -= 1;
            true
        } else if self.waiting > 0 {
            self.waiting -= 1;
            true
        } else {
            false
        }
    }

    fn completion(&self) -> f64 {
        let by_objects = if self.total == 0 {
            0.0
        } else {
            (self.success + self.failure) as f64 / self.total as f64
        };
        let by_steps = if self.total_steps == 0 {
            0.0
        } else {
            let current = if self.step_objects == 0 {
                0.0
            } else {
                self.step_objects_done as f64 / self.step_objects as f64
            };
            (self.completed_steps as f64 + current) / self.total_steps as f64
        };
        (by_objects.max(by_steps) * 100.0).min(100.0)
    }
}

/// Concurrency-safe progress counters of one job
#[derive(Debug, Default)]
pub struct JobPluginInfo {
    progress: Mutex<Progress>,
}

impl JobPluginInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the number of objects the job will account for; all start waiting
    pub fn set_total(&self, total: usize) {
        let mut progress = self.progress.lock();
        progress.total = total;
        progress.waiting = total
            .saturating_sub(progress.being_processed + progress.success + progress.failure);
    }

    /// Move up to `count` objects from waiting into processing
    pub fn start_processing(&self, count: usize) {
        let mut progress = self.progress.lock();
        let moved = count.min(progress.waiting);
        progress.waiting -= moved;
        progress.being_processed += moved;
    }

    pub fn increment_success(&self) {
        let mut progress = self.progress.lock();
        if progress.take_one() {
            progress.success += 1;
        } else {
            warn!("Success reported for an object the job does not account for");
        }
    }

    pub fn increment_failure(&self) {
        let mut progress = self.progress.lock();
        if progress.take_one() {
            progress.failure += 1;
        } else {
            warn!("Failure reported for an object the job does not account for");
        }
    }

    /// Count a terminal report outcome; `Running` is ignored
    pub fn increment(&self, state: PluginState) {
        match state {
            PluginState::Running => {}
            state if state.counts_as_success() => self.increment_success(),
            _ => self.increment_failure(),
        }
    }

    /// Count `count` objects that will never be dispatched as failed
    pub fn fail_waiting(&self, count: usize) {
        let mut progress = self.progress.lock();
        let moved = count.min(progress.waiting);
        progress.waiting -= moved;
        progress.failure += moved;
    }

    pub fn begin_steps(&self, total_steps: usize) {
        let mut progress = self.progress.lock();
        progress.total_steps = total_steps;
        progress.completed_steps = 0;
    }

    pub fn begin_step(&self, objects: usize) {
        let mut progress = self.progress.lock();
        progress.step_objects = objects;
        progress.step_objects_done = 0;
    }

    pub fn step_object_done(&self) {
        let mut progress = self.progress.lock();
        if progress.step_objects_done < progress.step_objects {
            progress.step_objects_done += 1;
        }
    }

    pub fn finish_step(&self) {
        let mut progress = self.progress.lock();
        if progress.completed_steps < progress.total_steps {
            progress.completed_steps += 1;
        }
        progress.step_objects = 0;
        progress.step_objects_done = 0;
    }

    /// Consistent copy of all counters
    pub fn snapshot(&self) -> JobStats {
        let progress = *self.progress.lock();
        JobStats {
            total_objects: progress.total,
            objects_waiting: progress.waiting,
            objects_being_processed: progress.being_processed,
            processed_with_success: progress.success,
            processed_with_failure: progress.failure,
            completion_percentage: progress.completion(),
            total_steps: progress.total_steps,
            completed_steps: progress.completed_steps,
        }
    }
}
