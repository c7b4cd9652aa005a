// Copyright 2017 The Gfx-rs Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A worker thread standing in for the GPU queue.
//!
//! Jobs run in submission order. Every memory effect of a submitted command list (copies,
//! updates, clears, mips, resolves) and its completion callback executes here.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::{io, thread};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    jobs: VecDeque<Job>,
    busy: bool,
    exit: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

pub struct Queue {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Queue")
            .field("pending", &state.jobs.len())
            .field("busy", &state.busy)
            .finish()
    }
}

impl Queue {
    pub fn new(name: &str) -> io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(name.to_owned())
                .spawn(move || run(&shared))?
        };
        Ok(Queue {
            shared,
            worker: Some(worker),
        })
    }

    /// Append `job` after everything already queued.
    pub fn execute<F: FnOnce() + Send + 'static>(&self, job: F) {
        self.shared.state.lock().jobs.push_back(Box::new(job));
        self.shared.condvar.notify_all();
    }

    /// Block until every queued job has run.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while state.busy || !state.jobs.is_empty() {
            self.shared.condvar.wait(&mut state);
        }
    }

    /// Number of jobs not yet started.
    #[allow(dead_code)]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.shared.state.lock().exit = true;
        self.shared.condvar.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Queue worker terminated abnormally");
            }
        }
    }
}

fn run(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    state.busy = true;
                    break job;
                }
                if state.exit {
                    return;
                }
                shared.condvar.wait(&mut state);
            }
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("A queued job panicked");
        }
        shared.state.lock().busy = false;
        shared.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_in_order() {
        let queue = Queue::new("test-queue").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..16 {
            let log = Arc::clone(&log);
            queue.execute(move || log.lock().push(i));
        }
        queue.wait_idle();
        assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_survives_panicking_job() {
        let queue = Queue::new("test-queue").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        queue.execute(|| panic!("boom"));
        let c = Arc::clone(&counter);
        queue.execute(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        queue.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 0);
    }
}
