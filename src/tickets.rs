//! Ticket creation stub.
//!
//! Stands in for the downstream ticketing system: waits a fixed delay,
//! then hands back a random `TICKET-<n>` id. It never fails.

use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::pipeline::types::{ClassificationResult, TicketReceipt};

/// Upper bound (exclusive) of the numeric ticket suffix.
const TICKET_ID_RANGE: u32 = 10_000;

pub struct TicketService {
    latency: Duration,
}

impl TicketService {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    /// Open a ticket for a classified email.
    pub async fn create_ticket(&self, result: &ClassificationResult) -> TicketReceipt {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let number = rand::thread_rng().gen_range(0..TICKET_ID_RANGE);
        let ticket_id = format!("TICKET-{number}");

        info!(
            ticket_id = %ticket_id,
            classification_id = %result.id,
            team = %result.assigned_team,
            "Ticket created"
        );

        TicketReceipt {
            ticket_id,
            success: true,
        }
    }
}
