use std::{collections::HashMap, sync::OnceLock};

use regex::Regex;

use crate::{
    domain::{ChatId, MessageRef, ThreadId, Ticket, UserId},
    session::{PendingAction, SessionView},
};

/// Transport-agnostic shape of an inbound message, extracted by the adapter
/// before classification.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub thread_id: Option<ThreadId>,
    pub reply_to: Option<ReplyTarget>,
    pub has_attachment: bool,
    pub from_bot: bool,
}

/// The message this one quotes, if any.
#[derive(Clone, Debug)]
pub struct ReplyTarget {
    pub message: MessageRef,
    pub text: Option<String>,
}

impl InboundMessage {
    /// Text content, falling back to the media caption.
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

/// The single classification outcome consumed by one dispatch `match` in the
/// adapter. Everything that is not an explicit route is `Ignore`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutedAction {
    /// User-side message belonging to an existing open ticket.
    UserReply { ticket_id: String },
    /// Support-side message to be staged as a reply draft for a ticket.
    SupportReply { ticket_id: String },
    /// Admin search input armed by the admin panel.
    SearchTicket { query: String },
    SearchUser { query: String },
    /// Opening message of a new ticket (creation flag was set).
    OpenNewTicket,
    Ignore,
}

/// Leading markers of bot-generated status/history displays. Quoting one of
/// these must not be read as a ticket reference, or relayed history would
/// route back into the ticket it displays.
const SYSTEM_DISPLAY_MARKERS: &[&str] = &["📋", "📊", "🔒", "👤"];

fn ticket_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:ticket|тикет)\s*#([a-zA-Z0-9]+)|#([a-zA-Z0-9]+)")
            .unwrap_or_else(|e| panic!("invalid ticket reference regex: {e}"))
    })
}

/// Strips a leading `#` and known callback-action prefixes so ids pasted
/// from buttons or displays still resolve.
pub fn normalize_ticket_id(raw: &str) -> &str {
    let s = raw.trim();
    let s = s.strip_prefix("view_ticket_admin_").unwrap_or(s);
    let s = s.strip_prefix("admin_").unwrap_or(s);
    s.strip_prefix('#').unwrap_or(s)
}

/// Pulls a ticket id out of free text (`ticket #ab12cd34` or bare
/// `#ab12cd34`), skipping bot-generated display text.
pub fn extract_ticket_id(text: &str) -> Option<&str> {
    if is_system_display(text) {
        return None;
    }
    let caps = ticket_ref_regex().captures(text)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

fn is_system_display(text: &str) -> bool {
    let trimmed = text.trim_start();
    SYSTEM_DISPLAY_MARKERS
        .iter()
        .any(|m| trimmed.starts_with(m))
}

/// Resolves a possibly-decorated id against the ticket map.
pub fn find_ticket<'a>(tickets: &'a HashMap<String, Ticket>, raw: &str) -> Option<&'a Ticket> {
    tickets.get(normalize_ticket_id(raw))
}

fn ticket_by_thread(tickets: &HashMap<String, Ticket>, thread: ThreadId) -> Option<&Ticket> {
    tickets.values().find(|t| t.thread_id == thread)
}

/// Classifies one inbound message. Pure: no IO, no state mutation; the
/// caller consumes session one-shots (pending action, reply prompt) only
/// after it commits to the returned route.
///
/// Priority order, first match wins:
/// 1. reply correlation against the armed prompt,
/// 2. ticket-reference extraction from the quoted message,
/// 3. pending session action,
/// 4. support-thread match (thread id, then quoted-reference fallback),
/// 5. new-ticket creation flag.
pub fn classify(
    msg: &InboundMessage,
    session: &SessionView,
    tickets: &HashMap<String, Ticket>,
    support_chat: ChatId,
) -> RoutedAction {
    let in_support_chat = msg.chat_id == support_chat;

    // 1. Reply correlation: quoting the exact prompt we sent.
    if let (Some(target), Some(prompt)) = (&msg.reply_to, &session.reply_prompt) {
        if target.message == prompt.prompt {
            let ticket_id = prompt.ticket_id.clone();
            return if in_support_chat {
                RoutedAction::SupportReply { ticket_id }
            } else {
                RoutedAction::UserReply { ticket_id }
            };
        }
    }

    // 2. Reference extraction from the quoted message (user side).
    if !in_support_chat {
        if let Some(target) = &msg.reply_to {
            if let Some(id) = target.text.as_deref().and_then(extract_ticket_id) {
                if let Some(ticket) = find_ticket(tickets, id) {
                    if ticket.user_id == msg.user_id && ticket.is_open() {
                        return RoutedAction::UserReply {
                            ticket_id: ticket.id.clone(),
                        };
                    }
                }
            }
        }
    }

    // 3. Armed one-shot action. A reply armed in the support chat drafts a
    // support reply; armed in a private chat it appends to the user's ticket.
    if let Some(pending) = &session.pending {
        let query = msg.content().unwrap_or_default().to_string();
        return match pending {
            PendingAction::Reply { ticket_id } => {
                let ticket_id = ticket_id.clone();
                if in_support_chat {
                    RoutedAction::SupportReply { ticket_id }
                } else {
                    RoutedAction::UserReply { ticket_id }
                }
            }
            PendingAction::SearchTicket => RoutedAction::SearchTicket { query },
            PendingAction::SearchUser => RoutedAction::SearchUser { query },
        };
    }

    // 4. Support-thread match.
    if in_support_chat {
        if msg.from_bot {
            return RoutedAction::Ignore;
        }
        if msg.content().is_some_and(is_system_display) {
            return RoutedAction::Ignore;
        }
        if let Some(thread) = msg.thread_id {
            if let Some(ticket) = ticket_by_thread(tickets, thread) {
                if ticket.is_open() {
                    return RoutedAction::SupportReply {
                        ticket_id: ticket.id.clone(),
                    };
                }
            }
        }
        if let Some(target) = &msg.reply_to {
            if let Some(id) = target.text.as_deref().and_then(extract_ticket_id) {
                if let Some(ticket) = find_ticket(tickets, id) {
                    if ticket.is_open() {
                        return RoutedAction::SupportReply {
                            ticket_id: ticket.id.clone(),
                        };
                    }
                }
            }
        }
        return RoutedAction::Ignore;
    }

    // 5. New-ticket fallback.
    if session.creating_ticket && (msg.content().is_some() || msg.has_attachment) {
        return RoutedAction::OpenNewTicket;
    }

    RoutedAction::Ignore
}
