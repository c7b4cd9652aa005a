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

//! CPU-visible completion signals.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fmt, thread};

/// Observable state of a fence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FenceState {
    /// Not signaled and not attached to any submission.
    Unsignaled,
    /// Attached to a submission that has not completed yet.
    Pending,
    /// Signaled.
    Signaled,
}

#[derive(Debug)]
enum FenceInner {
    Idle { signaled: bool },
    Pending,
}

/// A binary signal raised when submitted work completes.
pub struct Fence {
    inner: Mutex<FenceInner>,
    condvar: Condvar,
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fence({:?})", self.state())
    }
}

impl Fence {
    /// Create a fence in the given state.
    pub fn new(signaled: bool) -> Self {
        Fence {
            inner: Mutex::new(FenceInner::Idle { signaled }),
            condvar: Condvar::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> FenceState {
        match *self.inner.lock() {
            FenceInner::Idle { signaled: true } => FenceState::Signaled,
            FenceInner::Idle { signaled: false } => FenceState::Unsignaled,
            FenceInner::Pending => FenceState::Pending,
        }
    }

    /// Whether the fence is signaled.
    pub fn is_signaled(&self) -> bool {
        self.state() == FenceState::Signaled
    }

    /// Attach the fence to a submission, returning the state it had before.
    pub(crate) fn mark_pending(&self) -> FenceState {
        let mut inner = self.inner.lock();
        let previous = match *inner {
            FenceInner::Idle { signaled: true } => FenceState::Signaled,
            FenceInner::Idle { signaled: false } => FenceState::Unsignaled,
            FenceInner::Pending => FenceState::Pending,
        };
        *inner = FenceInner::Pending;
        previous
    }

    /// Put back the state of a fence whose submission never started.
    pub(crate) fn restore(&self, state: FenceState) {
        *self.inner.lock() = match state {
            FenceState::Pending => FenceInner::Pending,
            FenceState::Signaled => FenceInner::Idle { signaled: true },
            FenceState::Unsignaled => FenceInner::Idle { signaled: false },
        };
    }

    /// Raise the fence, waking every waiter.
    pub fn signal(&self) {
        let mut inner = self.inner.lock();
        *inner = FenceInner::Idle { signaled: true };
        self.condvar.notify_all();
    }

    /// Return to the unsignaled state. No wait may be outstanding.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if let FenceInner::Pending = *inner {
            warn!("Resetting a fence whose submission is still in flight");
        }
        *inner = FenceInner::Idle { signaled: false };
    }

    /// Block until the fence is signaled or `timeout` elapses.
    ///
    /// Returns whether the fence was signaled.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        // A timeout past the representable range waits forever.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut inner = self.inner.lock();
        loop {
            if let FenceInner::Idle { signaled: true } = *inner {
                return true;
            }
            match deadline {
                None => self.condvar.wait(&mut inner),
                Some(deadline) => {
                    if self.condvar.wait_until(&mut inner, deadline).timed_out() {
                        return matches!(*inner, FenceInner::Idle { signaled: true });
                    }
                }
            }
        }
    }
}

/// Wait on several fences at once.
///
/// With `wait_all` every fence has to be signaled, otherwise any single one suffices.
pub fn wait_for_fences(fences: &[Arc<Fence>], wait_all: bool, timeout: Option<Duration>) -> bool {
    if fences.is_empty() {
        return true;
    }
    let start = Instant::now();
    let remaining = |timeout: Duration| timeout.checked_sub(start.elapsed()).unwrap_or_default();
    debug!("wait_for_fences {} fence(s), all: {}, timeout: {:?}", fences.len(), wait_all, timeout);

    if wait_all {
        return fences.iter().all(|fence| fence.wait(timeout.map(remaining)));
    }
    loop {
        if fences.iter().any(|fence| fence.is_signaled()) {
            return true;
        }
        if let Some(timeout) = timeout {
            if start.elapsed() >= timeout {
                return false;
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
}
