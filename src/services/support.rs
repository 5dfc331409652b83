//! Customer support tickets.
//!
//! Customers see and reply to their own tickets only; anything else reads as missing. Staff
//! replies are flagged and move an open ticket to in-progress.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::Actor;
use crate::domain::aggregates::support::{NewMessage, NewTicket, TicketPatch};
use crate::domain::aggregates::{SupportTicket, TicketMessage};
use crate::repository::SupportRepository;
use crate::{CommerceError, Result};

fn not_found() -> CommerceError { CommerceError::NotFound("Ticket not found".to_string()) }

#[derive(Clone)]
pub struct SupportService {
    tickets: Arc<dyn SupportRepository>,
}

impl SupportService {
    pub fn new(tickets: Arc<dyn SupportRepository>) -> Self { Self { tickets } }

    #[instrument(skip(self, input), fields(user_id = %actor.user_id))]
    pub async fn create(&self, actor: &Actor, input: NewTicket) -> Result<SupportTicket> {
        input.validate()?;
        let ticket = self.tickets.insert_ticket(&SupportTicket::open(input, actor.user_id)).await?;
        info!(ticket_id = %ticket.id, priority = %ticket.priority, "Support ticket opened");
        Ok(ticket)
    }

    pub async fn list(&self, actor: &Actor) -> Result<Vec<SupportTicket>> {
        let owner = (!actor.is_admin).then_some(actor.user_id);
        self.tickets.list_tickets(owner).await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<SupportTicket> {
        let ticket = self.tickets.find_ticket(id).await?.ok_or_else(not_found)?;
        if !actor.is_admin && ticket.user_id != Some(actor.user_id) {
            return Err(not_found());
        }
        Ok(ticket)
    }

    pub async fn update(&self, id: Uuid, patch: TicketPatch) -> Result<SupportTicket> {
        let mut ticket = self.tickets.find_ticket(id).await?.ok_or_else(not_found)?;
        let before = ticket.status;
        ticket.apply_patch(patch);
        let ticket = self.tickets.update_ticket(&ticket).await?.ok_or_else(not_found)?;
        if ticket.status != before {
            info!(ticket_id = %ticket.id, from = %before, to = %ticket.status, "Ticket status changed");
        }
        Ok(ticket)
    }

    pub async fn add_message(&self, actor: &Actor, id: Uuid, input: NewMessage) -> Result<TicketMessage> {
        input.validate()?;
        let mut ticket = self.get(actor, id).await?;
        let message = ticket.reply(actor.user_id, input.message, actor.is_admin);
        self.tickets.add_message(&ticket, &message).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.tickets.delete_ticket(id).await? {
            return Err(not_found());
        }
        Ok(())
    }
}
