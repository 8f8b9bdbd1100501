use serde::{Deserialize, Serialize};

/// Messenger user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Messenger chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Messenger message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i32);

/// Discussion-thread handle inside the support group (forum topic id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Who authored a history entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Support,
    System,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Document,
    Animation,
    Video,
}

impl AttachmentKind {
    /// File extension used when persisting a local copy.
    pub fn extension(self) -> &'static str {
        match self {
            AttachmentKind::Photo => "jpg",
            AttachmentKind::Document => "bin",
            AttachmentKind::Animation => "gif",
            AttachmentKind::Video => "mp4",
        }
    }
}

/// An attachment carried by a history entry. `external_ref` is the
/// transport-side file handle; `local_ref` is the best-effort local copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub external_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_ref: Option<String>,
}

/// One recorded message within a ticket. History order is insertion order;
/// it is never re-sorted by `time`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    pub from: Sender,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// Unix milliseconds at append time.
    pub time: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

/// One user's support conversation, bound 1:1 to a support-group thread.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub user_id: UserId,
    pub display_name: String,
    pub status: TicketStatus,
    pub thread_id: ThreadId,
    /// Unix milliseconds at creation time.
    pub created_at: i64,
    pub history: Vec<Entry>,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    /// Timestamp of the most recent entry, falling back to creation time.
    pub fn last_update(&self) -> i64 {
        self.history.last().map(|e| e.time).unwrap_or(self.created_at)
    }
}

/// Durable per-user record. Never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub banned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub registered_at: i64,
    pub last_activity_at: i64,
    pub ticket_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(now: i64, display_name: Option<String>) -> Self {
        Self {
            banned: false,
            language: None,
            registered_at: now,
            last_activity_at: now,
            ticket_count: 0,
            display_name,
        }
    }
}

/// Current unix-millisecond timestamp used for record fields.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
