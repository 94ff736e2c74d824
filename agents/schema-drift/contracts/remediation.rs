//! Healing and notification payloads exchanged with collaborators

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChangeKind, HealingStrategy, Severity};

/// Remediation step for one change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingActionKind {
    AddColumn,
    AlterColumnType,
    AlterNullability,
    ReorderColumn,
    RenameColumn,
    ManualReview,
}

impl HealingActionKind {
    /// Default confidence (0-100) before any semantic rescoring
    pub fn default_confidence(&self) -> u8 {
        match self {
            Self::AddColumn | Self::ReorderColumn => 90,
            Self::AlterColumnType | Self::AlterNullability => 70,
            Self::RenameColumn => 50,
            Self::ManualReview => 100,
        }
    }

    /// Whether the step can be applied without a human
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::ManualReview)
    }
}

/// One recommended remediation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingAction {
    /// Action kind
    pub kind: HealingActionKind,

    /// Component the action applies to
    pub component: String,

    /// Field the action applies to
    pub field: String,

    /// Change that motivated the action
    pub change: ChangeKind,

    /// Confidence 0-100
    pub confidence: u8,

    /// Human description
    pub description: String,
}

/// Ordered remediation steps for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingPlan {
    pub actions: Vec<HealingAction>,
}

impl HealingPlan {
    /// Whether every step can be applied without a human
    pub fn is_fully_automatic(&self) -> bool {
        self.actions.iter().all(|a| a.kind.is_automatic())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Request handed to the healing collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingRequest {
    pub request_id: Uuid,
    pub pipeline_id: String,
    pub strategy: HealingStrategy,
    pub severity: Severity,
    pub plan: HealingPlan,
}

/// What the healing collaborator did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingOutcome {
    /// Whether the fix was applied or queued
    pub applied: bool,

    /// Collaborator reference (ticket, job id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Plan that was submitted
    pub plan: HealingPlan,
}

/// Message sent to notification channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub request_id: Uuid,
    pub pipeline_id: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_contact: Option<String>,
    /// One line per change
    pub changes: Vec<String>,
}

impl NotificationPayload {
    /// Subject line for channels that need one
    pub fn subject(&self) -> String {
        format!(
            "Schema drift ({}) on pipeline {}",
            self.severity, self.pipeline_id
        )
    }
}

/// Acknowledgement from a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Per-channel delivery result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDelivery {
    pub channel: String,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of the notification stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub deliveries: Vec<ChannelDelivery>,
}

impl NotificationOutcome {
    pub fn all_delivered(&self) -> bool {
        self.deliveries.iter().all(|d| d.delivered)
    }

    pub fn failed_channels(&self) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter(|d| !d.delivered)
            .map(|d| d.channel.as_str())
            .collect()
    }
}
