// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::Error;
use futures::executor::ThreadPool;
use futures::future::AbortHandle;
use futures::prelude::*;
use futures_timer::Delay;
use std::time::Duration;

/// The shared scheduler the exchange core runs on: a thread pool for write
/// and callback tasks plus delayed task scheduling for retransmissions.
///
/// A `Scheduler` is a cheap clonable handle; one instance is typically
/// shared by every channel of a client.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pool: ThreadPool,
}

impl Scheduler {
    /// Creates a new scheduler backed by a freshly spawned thread pool.
    pub fn new() -> Result<Scheduler, Error> {
        let pool = ThreadPool::builder()
            .name_prefix("coap-exchange-")
            .create()?;
        Ok(Scheduler { pool })
    }

    /// Runs the given future on the pool.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pool.spawn_ok(future);
    }

    /// Runs the given future on the pool after `delay` has elapsed.
    ///
    /// The returned handle cancels the task on a best-effort basis: a task
    /// that races its cancellation may still run, so tasks whose effect must
    /// not happen twice have to re-check their own preconditions.
    pub fn schedule<F>(&self, delay: Duration, future: F) -> ScheduledTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (task, handle) = futures::future::abortable(async move {
            Delay::new(delay).await;
            future.await;
        });
        self.pool.spawn_ok(task.map(|_| ()));
        ScheduledTask { handle }
    }
}

/// Handle to a task scheduled via [`Scheduler::schedule`].
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    handle: AbortHandle,
}

impl ScheduledTask {
    /// Requests cancellation of the scheduled task. A no-op if the task has
    /// already started or finished.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}
