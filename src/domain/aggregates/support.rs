//! Support tickets and their message threads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::nullable;

text_enum! {
    pub enum TicketStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

text_enum! {
    pub enum TicketPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl TicketStatus {
    pub fn is_settled(&self) -> bool { matches!(self, Self::Resolved | Self::Closed) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Oldest first.
    #[serde(default)]
    pub messages: Vec<TicketMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Option<Uuid>,
    pub message: String,
    pub is_staff_reply: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewTicket {
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    #[validate(length(min = 1, max = 10000))]
    pub description: String,
    pub priority: Option<TicketPriority>,
}

/// Staff-side update.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<Uuid>>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewMessage {
    #[validate(length(min = 1, max = 10000))]
    pub message: String,
}

impl SupportTicket {
    pub fn open(new: NewTicket, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: Some(user_id),
            order_id: new.order_id,
            subject: new.subject.trim().to_string(),
            description: new.description,
            status: TicketStatus::Open,
            priority: new.priority.unwrap_or(TicketPriority::Medium),
            assigned_to: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            messages: Vec::new(),
        }
    }

    /// The first move to resolved or closed stamps `resolved_at`; reopening clears it.
    pub fn apply_patch(&mut self, patch: TicketPatch) {
        let now = Utc::now();
        if let Some(status) = patch.status {
            self.resolved_at = if status.is_settled() { self.resolved_at.or(Some(now)) } else { None };
            self.status = status;
        }
        if let Some(v) = patch.priority { self.priority = v; }
        if let Some(v) = patch.assigned_to { self.assigned_to = v; }
        self.updated_at = now;
    }

    /// Appends a message. The first staff reply picks an open ticket up.
    pub fn reply(&mut self, user_id: Uuid, text: String, is_staff: bool) -> TicketMessage {
        let now = Utc::now();
        let message = TicketMessage {
            id: Uuid::now_v7(),
            ticket_id: self.id,
            user_id: Some(user_id),
            message: text,
            is_staff_reply: is_staff,
            created_at: now,
        };
        if is_staff && self.status == TicketStatus::Open { self.status = TicketStatus::InProgress; }
        self.updated_at = now;
        self.messages.push(message.clone());
        message
    }
}
