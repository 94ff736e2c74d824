//! Default collaborator adapters used by the CLI and the HTTP service

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CollaboratorError, CollaboratorResult, Connector, Healer, Notifier};
use crate::contracts::*;
use crate::lineage::CanonicalPayload;

/// Reads a canonical payload file from the component's locator
#[derive(Debug, Default, Clone)]
pub struct PayloadFileConnector;

#[async_trait]
impl Connector for PayloadFileConnector {
    fn id(&self) -> &str {
        "payload-file"
    }

    fn supports(&self, _kind: ComponentKind) -> bool {
        true
    }

    async fn extract_schema(&self, component: &Component) -> CollaboratorResult<Vec<FieldSpec>> {
        let path = component.locator.as_deref().ok_or_else(|| {
            CollaboratorError::Unavailable(format!("component '{}' has no locator", component.name))
        })?;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("{}: {}", path, e)))?;
        let payload = CanonicalPayload::from_json(&raw)
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        if payload.component != component.name {
            return Err(CollaboratorError::InvalidResponse(format!(
                "payload describes '{}', expected '{}'",
                payload.component, component.name
            )));
        }
        Ok(payload.fields)
    }
}

/// Writes notifications to the log instead of an external channel
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: &str, payload: &NotificationPayload) -> CollaboratorResult<DeliveryAck> {
        let message_id = Uuid::new_v4().to_string();
        warn!(
            channel,
            message_id = %message_id,
            request_id = %payload.request_id,
            pipeline_id = %payload.pipeline_id,
            severity = %payload.severity,
            operator = payload.operator_contact.as_deref().unwrap_or("-"),
            changes = payload.changes.len(),
            "{}",
            payload.subject()
        );
        Ok(DeliveryAck {
            channel: channel.to_string(),
            message_id: Some(message_id),
        })
    }
}

/// Default number of plans a [`QueueingHealer`] holds before rejecting
pub const DEFAULT_HEALING_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct HealingQueue {
    pending: VecDeque<HealingRequest>,
    enqueued: u64,
}

/// Queues healing plans for an out-of-band executor.
///
/// Bounded: once `capacity` plans are pending, further plans are rejected
/// until the executor drains the queue.
#[derive(Debug)]
pub struct QueueingHealer {
    queue: Mutex<HealingQueue>,
    capacity: usize,
}

impl Default for QueueingHealer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HEALING_QUEUE_CAPACITY)
    }
}

impl QueueingHealer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(HealingQueue::default()),
            capacity,
        }
    }

    /// Pending requests, oldest first
    pub fn queued(&self) -> Vec<HealingRequest> {
        self.queue
            .lock()
            .map(|q| q.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Hand every pending request to the executor
    pub fn drain(&self) -> Vec<HealingRequest> {
        self.queue
            .lock()
            .map(|mut q| q.pending.drain(..).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Healer for QueueingHealer {
    async fn heal(&self, request: &HealingRequest) -> CollaboratorResult<HealingOutcome> {
        let ticket = {
            let mut queue = self
                .queue
                .lock()
                .map_err(|e| CollaboratorError::Other(e.to_string()))?;
            if queue.pending.len() >= self.capacity {
                return Err(CollaboratorError::Rejected(format!(
                    "healing queue full ({} pending)",
                    queue.pending.len()
                )));
            }
            queue.pending.push_back(request.clone());
            queue.enqueued += 1;
            queue.enqueued
        };
        info!(
            request_id = %request.request_id,
            pipeline_id = %request.pipeline_id,
            strategy = request.strategy.as_str(),
            actions = request.plan.actions.len(),
            ticket,
            "Queued healing plan"
        );
        Ok(HealingOutcome {
            applied: true,
            reference: Some(format!("queue-{}", ticket)),
            plan: request.plan.clone(),
        })
    }
}
