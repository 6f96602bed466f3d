// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Inter-container publish/subscribe messaging.
//!
//! Publishing duplicates the topic, content type, and payload into each
//! subscriber's sandbox memory through its execution environment, then
//! enqueues one `Message` event per subscriber. The dispatcher therefore
//! never copies host memory into a guest; it only forwards offsets.

use crate::queue::EventQueue;
use crate::registry::Registry;
use ocre_core::{Error, Event, ModuleId, ResourceKind, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Subscription slots across all modules.
pub const MAX_SUBSCRIPTIONS: usize = 32;

/// Largest accepted payload, matching the legacy queue message cap.
pub const MAX_PAYLOAD: usize = 4096;

struct Subscription {
    module: ModuleId,
    topic: String,
}

pub struct MessagingService {
    subscriptions: Mutex<Vec<Subscription>>,
    next_message_id: AtomicU64,
    queue: Arc<EventQueue>,
    registry: Arc<Registry>,
}

impl MessagingService {
    pub fn new(queue: Arc<EventQueue>, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            subscriptions: Mutex::new(Vec::new()),
            next_message_id: AtomicU64::new(0),
            queue,
            registry,
        })
    }

    /// Subscribe the module to a topic, routing messages to `handler` (the
    /// module's messaging dispatcher).
    pub fn subscribe(&self, module: ModuleId, topic: &str, handler: &str) -> Result<()> {
        if topic.is_empty() {
            return Err(Error::invalid_argument("empty topic"));
        }

        self.registry.register_dispatcher(module, ResourceKind::Messaging, handler)?;

        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.len() >= MAX_SUBSCRIPTIONS {
            return Err(Error::ResourceExhausted("subscription slots"));
        }
        if subscriptions.iter().any(|s| s.module == module && s.topic == topic) {
            return Err(Error::conflict(format!("already subscribed to '{topic}'")));
        }
        subscriptions.push(Subscription { module, topic: topic.to_string() });
        drop(subscriptions);
        self.registry.increment_resource_count(module, ResourceKind::Messaging);
        debug!(module = %module, topic, handler, "subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, module: ModuleId, topic: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock();
        let index = subscriptions
            .iter()
            .position(|s| s.module == module && s.topic == topic)
            .ok_or_else(|| Error::not_found(format!("subscription to '{topic}'")))?;
        subscriptions.remove(index);
        drop(subscriptions);
        self.registry.decrement_resource_count(module, ResourceKind::Messaging);
        Ok(())
    }

    /// Publish to every subscriber of `topic`. Returns the number of
    /// subscribers the message was delivered to.
    ///
    /// Delivery to one subscriber is independent of the others: a failed
    /// copy-in or a full queue frees the partial buffers, logs, and moves on.
    pub fn publish(&self, topic: &str, content_type: &str, payload: &[u8]) -> Result<usize> {
        if topic.is_empty() {
            return Err(Error::invalid_argument("empty topic"));
        }
        if content_type.is_empty() {
            return Err(Error::invalid_argument("empty content type"));
        }
        if payload.is_empty() {
            return Err(Error::invalid_argument("empty payload"));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::invalid_argument(format!(
                "payload {} bytes exceeds {MAX_PAYLOAD}",
                payload.len()
            )));
        }

        let targets: Vec<ModuleId> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.module)
            .collect();

        // Guest strings carry their NUL, payload stays raw.
        let mut topic_bytes = topic.as_bytes().to_vec();
        topic_bytes.push(0);
        let mut content_type_bytes = content_type.as_bytes().to_vec();
        content_type_bytes.push(0);

        let mut delivered = 0;
        for module in targets {
            let Some(exec_env) = self.registry.exec_env(module) else {
                debug!(module = %module, topic, "subscriber vanished before delivery");
                continue;
            };

            let refs = (|| -> Result<(u32, u32, u32)> {
                let topic_ref = exec_env.copy_in(&topic_bytes)?;
                let content_type_ref = match exec_env.copy_in(&content_type_bytes) {
                    Ok(r) => r,
                    Err(e) => {
                        exec_env.free(topic_ref);
                        return Err(e);
                    }
                };
                let payload_ref = match exec_env.copy_in(payload) {
                    Ok(r) => r,
                    Err(e) => {
                        exec_env.free(topic_ref);
                        exec_env.free(content_type_ref);
                        return Err(e);
                    }
                };
                Ok((topic_ref, content_type_ref, payload_ref))
            })();

            let (topic_ref, content_type_ref, payload_ref) = match refs {
                Ok(refs) => refs,
                Err(e) => {
                    warn!(module = %module, topic, error = %e, "copy-in failed, skipping subscriber");
                    continue;
                }
            };

            let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
            let event = Event::Message {
                message_id,
                topic: topic_ref,
                content_type: content_type_ref,
                payload: payload_ref,
                payload_len: payload.len() as u32,
                owner: module,
            };

            if let Err(e) = self.queue.publish(event) {
                warn!(module = %module, topic, error = %e, "queue full, dropping message");
                exec_env.free(topic_ref);
                exec_env.free(content_type_ref);
                exec_env.free(payload_ref);
                continue;
            }

            delivered += 1;
        }

        Ok(delivered)
    }

    /// Cleanup handler: drop all subscriptions of a dying module.
    pub fn cleanup(&self, module: ModuleId) {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.module != module);
        let removed = before - subscriptions.len();
        drop(subscriptions);
        for _ in 0..removed {
            self.registry.decrement_resource_count(module, ResourceKind::Messaging);
        }
        if removed > 0 {
            debug!(module = %module, removed, "cleaned up subscriptions");
        }
    }
}

#[cfg(test)]
#[path = "messaging_tests.rs"]
mod tests;
