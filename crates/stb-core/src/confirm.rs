use std::{collections::HashMap, time::Duration};

use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{domain::Attachment, errors::Error, tickets::TicketService, Result};

/// Prefix of relayed user messages in support threads; stripped from quoted
/// text before it goes into a preview.
const RELAY_PREFIX: &str = "📨";

/// A staged support reply waiting for an explicit send/cancel tap.
#[derive(Clone, Debug)]
pub struct PendingConfirmation {
    pub ticket_id: String,
    pub content: String,
    pub attachment: Option<Attachment>,
    created: Instant,
}

/// Outcome of a successful `stage` call: what the adapter needs to render
/// the confirm/cancel keyboard.
#[derive(Clone, Debug)]
pub struct StagedReply {
    pub confirm_id: String,
    pub preview: String,
}

/// Two-phase guard for outbound support replies: nothing reaches the user
/// until support confirms the preview.
///
/// Entries expire after `ttl`; eviction is lazy, so an expired id simply
/// reports not-found on the next touch. Settled ids (accepted or cancelled)
/// are removed in all outcomes, including failed relays.
pub struct ConfirmationWorkflow {
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    ttl: Duration,
}

impl ConfirmationWorkflow {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Validates the target ticket and stores the draft, returning the
    /// correlation id and a rendered preview.
    pub async fn stage(
        &self,
        svc: &TicketService,
        ticket_id: &str,
        content: &str,
        attachment: Option<Attachment>,
        quoted: Option<&str>,
    ) -> Result<StagedReply> {
        self.stage_at(svc, ticket_id, content, attachment, quoted, Instant::now())
            .await
    }

    pub async fn stage_at(
        &self,
        svc: &TicketService,
        ticket_id: &str,
        content: &str,
        attachment: Option<Attachment>,
        quoted: Option<&str>,
        now: Instant,
    ) -> Result<StagedReply> {
        let ticket = svc
            .find(ticket_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ticket #{ticket_id}")))?;
        if !ticket.is_open() {
            return Err(Error::InvalidState(format!(
                "ticket #{} is closed",
                ticket.id
            )));
        }

        let mut params: Vec<(&str, &str)> = vec![
            ("id", &ticket.id),
            ("name", &ticket.display_name),
            ("content", content),
        ];
        let quoted_clean = quoted.map(strip_relay_prefix);
        let quoted_line = match quoted_clean.as_deref() {
            Some(q) => svc.locales().resolve(None, "reply_preview_quoted", &[("quoted", q)]),
            None => String::new(),
        };
        params.push(("quoted", &quoted_line));
        let preview = svc.locales().resolve(None, "reply_preview", &params);

        let confirm_id = Uuid::new_v4().simple().to_string();
        let mut pending = self.pending.lock().await;
        pending.insert(
            confirm_id.clone(),
            PendingConfirmation {
                ticket_id: ticket.id.clone(),
                content: content.to_string(),
                attachment,
                created: now,
            },
        );

        Ok(StagedReply {
            confirm_id,
            preview,
        })
    }

    /// Delivers a staged reply to the ticket's user and records the support
    /// entry. Relay first, record second: a failed delivery leaves no
    /// history entry. The staged record is removed in all outcomes.
    pub async fn accept(&self, svc: &TicketService, confirm_id: &str) -> Result<String> {
        self.accept_at(svc, confirm_id, Instant::now()).await
    }

    pub async fn accept_at(
        &self,
        svc: &TicketService,
        confirm_id: &str,
        now: Instant,
    ) -> Result<String> {
        let staged = self.take(confirm_id, now).await?;

        let ticket = svc
            .find(&staged.ticket_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ticket #{}", staged.ticket_id)))?;
        if !ticket.is_open() {
            return Err(Error::InvalidState(format!(
                "ticket #{} is closed",
                ticket.id
            )));
        }

        let lang = svc.user_lang(ticket.user_id).await.unwrap_or(None);
        let text = svc.locales().resolve(
            lang.as_deref(),
            "support_reply",
            &[("id", &ticket.id), ("content", &staged.content)],
        );

        let delivered = match &staged.attachment {
            Some(att) => {
                svc.messenger()
                    .send_attachment(
                        crate::domain::ChatId(ticket.user_id.0),
                        att,
                        Some(&text),
                        None,
                    )
                    .await
            }
            None => svc.send_to_user(ticket.user_id, &text).await,
        };
        if let Err(err) = delivered {
            svc.events().error(
                "relay_failed",
                json!({"ticket_id": ticket.id, "direction": "to_user", "error": err.to_string()}),
            );
            return Err(err);
        }

        svc.record_support_entry(&ticket.id, &staged.content, staged.attachment.clone())
            .await?;

        svc.events().info(
            "support_reply_sent",
            json!({"ticket_id": ticket.id, "user_id": ticket.user_id.0}),
        );

        Ok(ticket.id)
    }

    /// Drops a staged reply. Unknown, expired and already-settled ids all
    /// report not-found.
    pub async fn cancel(&self, confirm_id: &str) -> Result<()> {
        self.cancel_at(confirm_id, Instant::now()).await
    }

    pub async fn cancel_at(&self, confirm_id: &str, now: Instant) -> Result<()> {
        self.take(confirm_id, now).await.map(|_| ())
    }

    async fn take(&self, confirm_id: &str, now: Instant) -> Result<PendingConfirmation> {
        let mut pending = self.pending.lock().await;
        pending.retain(|_, p| now.duration_since(p.created) < self.ttl);
        pending
            .remove(confirm_id)
            .ok_or_else(|| Error::NotFound(format!("confirmation {confirm_id}")))
    }
}

fn strip_relay_prefix(quoted: &str) -> String {
    quoted
        .trim_start()
        .strip_prefix(RELAY_PREFIX)
        .map(|rest| rest.trim_start().to_string())
        .unwrap_or_else(|| quoted.to_string())
}
