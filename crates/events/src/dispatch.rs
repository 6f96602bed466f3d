// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Dispatcher worker pool.
//!
//! A fixed number of threads drain the event queue in batches and invoke the
//! owning module's registered callback through its execution environment. The
//! dispatcher snapshot (function name + exec env) is taken under the registry
//! lock; the call itself happens with no lock held, so a module that
//! unregisters concurrently just turns the call into a logged no-op.

use crate::queue::EventQueue;
use crate::registry::{DispatchTarget, Registry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Dispatcher threads in the pool.
pub const DEFAULT_POOL_SIZE: usize = 2;

/// Events drained per wakeup.
const BATCH_SIZE: usize = 10;

pub struct DispatcherPool {
    workers: Mutex<Vec<JoinHandle<()>>>,
    queue: Arc<EventQueue>,
}

impl DispatcherPool {
    /// Spawn `threads` dispatcher workers over the queue and registry.
    pub fn start(queue: Arc<EventQueue>, registry: Arc<Registry>, threads: usize) -> Self {
        let workers = (0..threads)
            .map(|index| {
                let queue = Arc::clone(&queue);
                let registry = Arc::clone(&registry);
                std::thread::Builder::new()
                    .name(format!("ocre-dispatch-{index}"))
                    .spawn(move || dispatch_loop(&queue, &registry))
            })
            .collect::<std::io::Result<Vec<_>>>()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to spawn full dispatcher pool");
                Vec::new()
            });

        Self { workers: Mutex::new(workers), queue }
    }

    /// Stop the pool: shut the queue down and join every worker.
    pub fn shutdown(&self) {
        self.queue.shutdown();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                warn!("dispatcher thread panicked during shutdown");
            }
        }
    }
}

fn dispatch_loop(queue: &EventQueue, registry: &Registry) {
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    loop {
        batch.clear();
        if !queue.pop_batch(BATCH_SIZE, &mut batch) {
            return;
        }

        for event in batch.drain(..) {
            let owner = event.owner();
            let kind = event.kind();

            let (function, exec_env) = match registry.dispatch_target(owner, kind) {
                DispatchTarget::Call { function, exec_env } => (function, exec_env),
                DispatchTarget::UnknownModule => {
                    debug!(module = %owner, kind = %kind, "dropping event for unknown module");
                    continue;
                }
                DispatchTarget::NoDispatcher => {
                    debug!(module = %owner, kind = %kind, "dropping event with no dispatcher");
                    continue;
                }
            };

            // Invoked with no registry lock held; failure means the sandbox
            // went away between the snapshot and the call.
            if let Err(e) = exec_env.dispatch(&function, event.dispatch_call()) {
                debug!(module = %owner, kind = %kind, error = %e, "dispatch failed");
                continue;
            }

            registry.touch(owner);
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
