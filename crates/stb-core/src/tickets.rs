use std::{collections::HashMap, sync::Arc};

use serde_json::json;
use uuid::Uuid;

use crate::{
    config::Config,
    domain::{
        now_millis, Attachment, ChatId, Entry, MessageRef, Sender, Ticket, TicketStatus, User,
        UserId,
    },
    errors::Error,
    eventlog::EventLog,
    locales::LocaleStore,
    media::MediaStore,
    messaging::port::MessagingPort,
    router,
    store::JsonCollection,
    Result,
};

const TICKET_ID_LEN: usize = 8;
const ID_RETRY_ATTEMPTS: usize = 5;

/// Why a ticket was closed. Carried into the terminal history entry and the
/// closure summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    User,
    Admin,
    System,
    Ban,
}

impl CloseReason {
    pub fn label(self) -> &'static str {
        match self {
            CloseReason::User => "user",
            CloseReason::Admin => "admin",
            CloseReason::System => "system",
            CloseReason::Ban => "ban",
        }
    }

    fn terminal_note(self) -> &'static str {
        match self {
            CloseReason::User => "Ticket closed by the user",
            CloseReason::Admin => "Ticket closed by support",
            CloseReason::System => "Ticket closed",
            CloseReason::Ban => "Ticket closed: user banned",
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    pub total_tickets: usize,
    pub open_tickets: usize,
    pub users: usize,
    pub banned_users: usize,
}

/// Application service owning ticket lifecycle, user records and relays.
///
/// All Telegram specifics stay behind the `MessagingPort`; this type only
/// knows about chats, threads and localized templates.
pub struct TicketService {
    cfg: Arc<Config>,
    tickets: Arc<JsonCollection<Ticket>>,
    users: Arc<JsonCollection<User>>,
    messenger: Arc<dyn MessagingPort>,
    locales: Arc<LocaleStore>,
    media: MediaStore,
    events: Arc<EventLog>,
}

impl TicketService {
    pub fn new(
        cfg: Arc<Config>,
        tickets: Arc<JsonCollection<Ticket>>,
        users: Arc<JsonCollection<User>>,
        messenger: Arc<dyn MessagingPort>,
        locales: Arc<LocaleStore>,
        media: MediaStore,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            cfg,
            tickets,
            users,
            messenger,
            locales,
            media,
            events,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn locales(&self) -> &LocaleStore {
        &self.locales
    }

    pub fn messenger(&self) -> &Arc<dyn MessagingPort> {
        &self.messenger
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    fn support_chat(&self) -> ChatId {
        ChatId(self.cfg.support_group_id)
    }

    // ---------- lookup ----------

    pub async fn snapshot(&self) -> Result<HashMap<String, Ticket>> {
        self.tickets.snapshot().await
    }

    /// Normalized lookup: accepts `#id`, callback-decorated ids and bare ids.
    pub async fn find(&self, raw: &str) -> Result<Option<Ticket>> {
        let map = self.tickets.snapshot().await?;
        Ok(router::find_ticket(&map, raw).cloned())
    }

    /// All tickets of one user, newest first.
    pub async fn tickets_for(&self, user_id: UserId) -> Result<Vec<Ticket>> {
        let map = self.tickets.snapshot().await?;
        let mut out: Vec<Ticket> = map.into_values().filter(|t| t.user_id == user_id).collect();
        out.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        Ok(out)
    }

    pub async fn open_tickets_for(&self, user_id: UserId) -> Result<Vec<Ticket>> {
        Ok(self
            .tickets_for(user_id)
            .await?
            .into_iter()
            .filter(Ticket::is_open)
            .collect())
    }

    // ---------- user records ----------

    /// Create-on-first-contact and per-event activity tracking.
    pub async fn track_user(&self, user_id: UserId, display_name: Option<&str>) -> Result<User> {
        let now = now_millis();
        self.users
            .with_mut(|m| {
                let user = m
                    .entry(user_id.0.to_string())
                    .or_insert_with(|| User::new(now, display_name.map(str::to_string)));
                user.last_activity_at = now;
                if let Some(name) = display_name {
                    user.display_name = Some(name.to_string());
                }
                user.clone()
            })
            .await
    }

    pub async fn user(&self, user_id: UserId) -> Result<Option<User>> {
        let map = self.users.snapshot().await?;
        Ok(map.get(&user_id.0.to_string()).cloned())
    }

    pub async fn user_lang(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.user(user_id).await?.and_then(|u| u.language))
    }

    pub async fn set_language(&self, user_id: UserId, lang: &str) -> Result<()> {
        let now = now_millis();
        self.users
            .with_mut(|m| {
                let user = m
                    .entry(user_id.0.to_string())
                    .or_insert_with(|| User::new(now, None));
                user.language = Some(lang.to_string());
            })
            .await
    }

    pub async fn is_banned(&self, user_id: UserId) -> Result<bool> {
        Ok(self.user(user_id).await?.map(|u| u.banned).unwrap_or(false))
    }

    // ---------- creation ----------

    /// Opens a new ticket: cap check, fresh id, support-group thread, first
    /// history entry, then the header and opening message relayed into the
    /// thread.
    pub async fn create_ticket(
        &self,
        user_id: UserId,
        display_name: &str,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<Ticket> {
        let open = self.open_tickets_for(user_id).await?;
        if open.len() as u32 >= self.cfg.max_open_tickets {
            self.events.warn(
                "ticket_creation_limit",
                json!({"user_id": user_id.0, "open": open.len()}),
            );
            return Err(Error::InvalidState(format!(
                "user {} already has {} open tickets",
                user_id.0,
                open.len()
            )));
        }

        let existing = self.tickets.snapshot().await?;
        let mut id = generate_ticket_id();
        for _ in 0..ID_RETRY_ATTEMPTS {
            if !existing.contains_key(&id) {
                break;
            }
            id = generate_ticket_id();
        }

        let attachment = self.localize_attachment(&id, 0, attachment).await;

        let thread = self
            .messenger
            .create_thread(&format!("#{id} | {display_name}"))
            .await?;

        let now = now_millis();
        let ticket = Ticket {
            id: id.clone(),
            user_id,
            display_name: display_name.to_string(),
            status: TicketStatus::Open,
            thread_id: thread,
            created_at: now,
            history: vec![Entry {
                from: Sender::User,
                content: content.to_string(),
                attachment: attachment.clone(),
                time: now,
            }],
        };

        let inserted = self
            .tickets
            .with_mut(|m| {
                if m.contains_key(&id) {
                    return false;
                }
                m.insert(id.clone(), ticket.clone());
                true
            })
            .await?;
        if !inserted {
            // The id raced with a concurrent creation; drop the orphan thread.
            if let Err(err) = self.messenger.delete_thread(thread).await {
                self.events.warn(
                    "thread_cleanup_failed",
                    json!({"ticket_id": id, "error": err.to_string()}),
                );
            }
            return Err(Error::External(format!("ticket id collision on {id}")));
        }

        self.users
            .with_mut(|m| {
                let user = m
                    .entry(user_id.0.to_string())
                    .or_insert_with(|| User::new(now, Some(display_name.to_string())));
                user.ticket_count += 1;
                user.last_activity_at = now;
            })
            .await?;

        let header = self.locales.resolve(
            None,
            "thread_header",
            &[
                ("id", &id),
                ("name", display_name),
                ("user_id", &user_id.0.to_string()),
            ],
        );
        self.relay_to_thread(&ticket, &header, None).await;
        let relay = self.locales.resolve(
            None,
            "relay_message",
            &[("name", display_name), ("content", content)],
        );
        self.relay_to_thread(&ticket, &relay, attachment.as_ref()).await;

        self.events.info(
            "ticket_created",
            json!({
                "ticket_id": id,
                "user_id": user_id.0,
                "thread_id": ticket.thread_id.0,
            }),
        );

        Ok(ticket)
    }

    // ---------- appends ----------

    /// Records a user message on an open ticket and relays it into the
    /// support thread.
    pub async fn append_user_entry(
        &self,
        ticket_id: &str,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<()> {
        let seq = self
            .find(ticket_id)
            .await?
            .map(|t| t.history.len())
            .unwrap_or(0);
        let attachment = self.localize_attachment(ticket_id, seq, attachment).await;

        let ticket = self
            .append_entry(ticket_id, Sender::User, content, attachment.clone())
            .await?;

        let relay = self.locales.resolve(
            None,
            "relay_message",
            &[("name", &ticket.display_name), ("content", content)],
        );
        let sent = match &attachment {
            Some(att) => {
                self.messenger
                    .send_attachment(
                        self.support_chat(),
                        att,
                        Some(&relay),
                        Some(ticket.thread_id),
                    )
                    .await
            }
            None => {
                self.messenger
                    .send_text(self.support_chat(), &relay, Some(ticket.thread_id))
                    .await
            }
        };
        if let Err(err) = sent {
            self.events.error(
                "relay_failed",
                json!({"ticket_id": ticket.id, "direction": "to_support", "error": err.to_string()}),
            );
            return Err(err);
        }
        Ok(())
    }

    /// Records an already-relayed support reply. The confirmation workflow
    /// delivers first and records second, so a failed relay leaves no entry.
    pub async fn record_support_entry(
        &self,
        ticket_id: &str,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<()> {
        self.append_entry(ticket_id, Sender::Support, content, attachment)
            .await?;
        Ok(())
    }

    async fn append_entry(
        &self,
        ticket_id: &str,
        from: Sender,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<Ticket> {
        let key = router::normalize_ticket_id(ticket_id).to_string();
        let now = now_millis();
        let content = content.to_string();
        self.tickets
            .with_mut(move |m| {
                let Some(ticket) = m.get_mut(&key) else {
                    return Err(Error::NotFound(format!("ticket #{key}")));
                };
                if !ticket.is_open() {
                    return Err(Error::InvalidState(format!("ticket #{key} is closed")));
                }
                ticket.history.push(Entry {
                    from,
                    content,
                    attachment,
                    time: now,
                });
                Ok(ticket.clone())
            })
            .await?
    }

    // ---------- closing ----------

    /// Closes an open ticket exactly once: status flip plus one terminal
    /// system entry, then three independent best-effort side effects (user
    /// notification, thread deletion, closure summary).
    pub async fn close_ticket(&self, ticket_id: &str, reason: CloseReason) -> Result<Ticket> {
        let key = router::normalize_ticket_id(ticket_id).to_string();
        let now = now_millis();
        let ticket = self
            .tickets
            .with_mut(move |m| {
                let Some(ticket) = m.get_mut(&key) else {
                    return Err(Error::NotFound(format!("ticket #{key}")));
                };
                if !ticket.is_open() {
                    return Err(Error::InvalidState(format!(
                        "ticket #{key} is already closed"
                    )));
                }
                ticket.status = TicketStatus::Closed;
                ticket.history.push(Entry {
                    from: Sender::System,
                    content: reason.terminal_note().to_string(),
                    attachment: None,
                    time: now,
                });
                Ok(ticket.clone())
            })
            .await??;

        // Side effects are independent: one failing must not block the rest.
        let lang = self.user_lang(ticket.user_id).await.unwrap_or(None);
        let notice =
            self.locales
                .resolve(lang.as_deref(), "ticket_closed_notice", &[("id", &ticket.id)]);
        if let Err(err) = self
            .messenger
            .send_text(ChatId(ticket.user_id.0), &notice, None)
            .await
        {
            self.events.warn(
                "close_notify_failed",
                json!({"ticket_id": ticket.id, "error": err.to_string()}),
            );
        }

        if let Err(err) = self.messenger.delete_thread(ticket.thread_id).await {
            self.events.warn(
                "thread_cleanup_failed",
                json!({"ticket_id": ticket.id, "error": err.to_string()}),
            );
        }

        let message_count = ticket
            .history
            .iter()
            .filter(|e| e.from != Sender::System)
            .count();
        let summary = self.locales.resolve(
            None,
            "closure_summary",
            &[
                ("id", &ticket.id),
                ("reason", reason.label()),
                ("lifetime", &format_lifetime(now - ticket.created_at)),
                ("count", &message_count.to_string()),
            ],
        );
        if let Err(err) = self.messenger.send_text(self.support_chat(), &summary, None).await {
            self.events.warn(
                "closure_summary_failed",
                json!({"ticket_id": ticket.id, "error": err.to_string()}),
            );
        }

        self.events.info(
            "ticket_closed",
            json!({
                "ticket_id": ticket.id,
                "user_id": ticket.user_id.0,
                "reason": reason.label(),
            }),
        );

        Ok(ticket)
    }

    // ---------- bans ----------

    /// Toggles a user's ban. Main admins only; admins cannot be banned.
    /// Banning closes every open ticket of the target.
    pub async fn set_banned(&self, actor: UserId, target: UserId, banned: bool) -> Result<bool> {
        if !self.cfg.is_main_admin(actor.0) {
            return Err(Error::PermissionDenied(format!(
                "user {} may not change bans",
                actor.0
            )));
        }
        if banned && self.cfg.is_admin(target.0) {
            return Err(Error::PermissionDenied(
                "administrators cannot be banned".to_string(),
            ));
        }

        let now = now_millis();
        self.users
            .with_mut(|m| {
                let user = m
                    .entry(target.0.to_string())
                    .or_insert_with(|| User::new(now, None));
                user.banned = banned;
            })
            .await?;

        if banned {
            for ticket in self.open_tickets_for(target).await? {
                if let Err(err) = self.close_ticket(&ticket.id, CloseReason::Ban).await {
                    self.events.warn(
                        "ban_close_failed",
                        json!({"ticket_id": ticket.id, "error": err.to_string()}),
                    );
                }
            }
        }

        self.events.info(
            if banned { "user_banned" } else { "user_unbanned" },
            json!({"user_id": target.0, "actor": actor.0}),
        );

        Ok(banned)
    }

    // ---------- misc ----------

    pub async fn stats(&self) -> Result<Stats> {
        let tickets = self.tickets.snapshot().await?;
        let users = self.users.snapshot().await?;
        Ok(Stats {
            total_tickets: tickets.len(),
            open_tickets: tickets.values().filter(|t| t.is_open()).count(),
            users: users.len(),
            banned_users: users.values().filter(|u| u.banned).count(),
        })
    }

    pub async fn send_to_user(&self, user_id: UserId, text: &str) -> Result<MessageRef> {
        self.messenger.send_text(ChatId(user_id.0), text, None).await
    }

    /// Records a throttled attempt. Handlers call this on every cooldown
    /// rejection so moderation can see repeat offenders in the log.
    pub fn note_spam_rejection(&self, user_id: UserId, action: &str) {
        self.events.warn(
            "spam_prevention",
            json!({"user_id": user_id.0, "action": action}),
        );
    }

    async fn relay_to_thread(&self, ticket: &Ticket, text: &str, attachment: Option<&Attachment>) {
        let sent = match attachment {
            Some(att) => {
                self.messenger
                    .send_attachment(self.support_chat(), att, Some(text), Some(ticket.thread_id))
                    .await
            }
            None => {
                self.messenger
                    .send_text(self.support_chat(), text, Some(ticket.thread_id))
                    .await
            }
        };
        if let Err(err) = sent {
            self.events.warn(
                "relay_failed",
                json!({"ticket_id": ticket.id, "direction": "to_support", "error": err.to_string()}),
            );
        }
    }

    /// Best-effort local copy of an attachment; on any failure the entry
    /// keeps the transport-side reference only.
    async fn localize_attachment(
        &self,
        ticket_id: &str,
        seq: usize,
        attachment: Option<Attachment>,
    ) -> Option<Attachment> {
        let mut att = attachment?;
        match self.messenger.fetch_attachment(&att.external_ref).await {
            Ok(bytes) => match self.media.save(ticket_id, seq, att.kind, &bytes) {
                Ok(path) => att.local_ref = Some(path.display().to_string()),
                Err(err) => self.events.warn(
                    "media_save_failed",
                    json!({"ticket_id": ticket_id, "error": err.to_string()}),
                ),
            },
            Err(err) => self.events.warn(
                "media_fetch_failed",
                json!({"ticket_id": ticket_id, "error": err.to_string()}),
            ),
        }
        Some(att)
    }
}

fn generate_ticket_id() -> String {
    Uuid::new_v4().simple().to_string()[..TICKET_ID_LEN].to_string()
}

/// Human-readable ticket lifetime for closure summaries.
pub fn format_lifetime(ms: i64) -> String {
    let total_minutes = (ms.max(0)) / 60_000;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        "<1m".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tmp_path, FakeMessenger};
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            bot_token: "token".to_string(),
            support_group_id: -1001,
            admin_ids: vec![900],
            main_admin_ids: vec![901],
            tickets_path: tmp_path("stb-tickets", "json"),
            users_path: tmp_path("stb-users", "json"),
            log_path: tmp_path("stb-events", "log"),
            media_dir: tmp_path("stb-media", "d"),
            locales_dir: tmp_path("stb-locales", "d"),
            max_open_tickets: 3,
            default_lang: "en".to_string(),
            message_cooldown: Duration::from_millis(2000),
            callback_cooldown: Duration::from_millis(2000),
            ticket_create_cooldown: Duration::from_millis(10_000),
            confirm_ttl: Duration::from_secs(1800),
        }
    }

    fn service() -> (TicketService, Arc<FakeMessenger>) {
        let cfg = Arc::new(test_config());
        let messenger = Arc::new(FakeMessenger::new());
        let svc = TicketService::new(
            cfg.clone(),
            Arc::new(JsonCollection::new(&cfg.tickets_path)),
            Arc::new(JsonCollection::new(&cfg.users_path)),
            messenger.clone(),
            Arc::new(LocaleStore::from_catalogs("en", HashMap::new())),
            MediaStore::new(&cfg.media_dir),
            Arc::new(EventLog::new(&cfg.log_path)),
        );
        (svc, messenger)
    }

    #[tokio::test]
    async fn create_ticket_opens_thread_and_records_first_entry() {
        let (svc, messenger) = service();

        let ticket = svc
            .create_ticket(UserId(5), "Alice", "Help me", None)
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.id.len(), TICKET_ID_LEN);
        assert_eq!(ticket.history.len(), 1);
        assert_eq!(ticket.history[0].from, Sender::User);
        assert_eq!(ticket.history[0].content, "Help me");

        let threads = messenger.threads_created.lock().await;
        assert_eq!(threads.len(), 1);
        assert!(threads[0].contains(&ticket.id));

        // Header + relayed opening message landed in the thread.
        let sent = messenger.sent.lock().await;
        assert!(sent.iter().all(|m| m.chat_id == ChatId(-1001)));
        assert!(sent.iter().all(|m| m.thread == Some(ticket.thread_id)));
    }

    #[tokio::test]
    async fn create_ticket_respects_open_cap() {
        let (svc, _messenger) = service();
        let u = UserId(5);

        for i in 0..3 {
            svc.create_ticket(u, "Alice", &format!("issue {i}"), None)
                .await
                .unwrap();
        }
        assert!(matches!(
            svc.create_ticket(u, "Alice", "one too many", None).await,
            Err(Error::InvalidState(_))
        ));
        let log = std::fs::read_to_string(&svc.config().log_path).unwrap();
        assert!(log.contains("ticket_creation_limit"));

        // Closing one frees a slot.
        let open = svc.open_tickets_for(u).await.unwrap();
        svc.close_ticket(&open[0].id, CloseReason::User).await.unwrap();
        svc.create_ticket(u, "Alice", "fits again", None).await.unwrap();
    }

    #[tokio::test]
    async fn find_normalizes_decorated_ids() {
        let (svc, _messenger) = service();
        let ticket = svc
            .create_ticket(UserId(5), "Alice", "Help", None)
            .await
            .unwrap();

        for raw in [
            ticket.id.clone(),
            format!("#{}", ticket.id),
            format!("view_ticket_admin_{}", ticket.id),
            format!("admin_{}", ticket.id),
        ] {
            let found = svc.find(&raw).await.unwrap();
            assert_eq!(found.map(|t| t.id), Some(ticket.id.clone()), "raw={raw}");
        }
        assert!(svc.find("zzzzzzzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_preserves_order_and_rejects_closed() {
        let (svc, _messenger) = service();
        let ticket = svc
            .create_ticket(UserId(5), "Alice", "first", None)
            .await
            .unwrap();

        svc.append_user_entry(&ticket.id, "second", None).await.unwrap();
        svc.record_support_entry(&ticket.id, "third", None).await.unwrap();

        let got = svc.find(&ticket.id).await.unwrap().unwrap();
        let contents: Vec<&str> = got.history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);

        svc.close_ticket(&ticket.id, CloseReason::Admin).await.unwrap();
        assert!(matches!(
            svc.append_user_entry(&ticket.id, "too late", None).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            svc.append_user_entry("missing1", "x", None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn close_is_exactly_once_with_terminal_entry() {
        let (svc, messenger) = service();
        let ticket = svc
            .create_ticket(UserId(5), "Alice", "Help", None)
            .await
            .unwrap();

        let closed = svc.close_ticket(&ticket.id, CloseReason::User).await.unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
        assert_eq!(closed.history.len(), 2);
        assert_eq!(closed.history[1].from, Sender::System);

        assert!(matches!(
            svc.close_ticket(&ticket.id, CloseReason::User).await,
            Err(Error::InvalidState(_))
        ));
        let after = svc.find(&ticket.id).await.unwrap().unwrap();
        assert_eq!(after.history.len(), 2);

        // Thread deleted, user notified, summary posted to the group root.
        assert_eq!(*messenger.threads_deleted.lock().await, vec![ticket.thread_id]);
        let sent = messenger.sent.lock().await;
        assert!(sent.iter().any(|m| m.chat_id == ChatId(5)));
        assert!(sent
            .iter()
            .any(|m| m.chat_id == ChatId(-1001) && m.thread.is_none()));
    }

    #[tokio::test]
    async fn ban_requires_main_admin_and_spares_admins() {
        let (svc, _messenger) = service();

        assert!(matches!(
            svc.set_banned(UserId(900), UserId(5), true).await,
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            svc.set_banned(UserId(901), UserId(900), true).await,
            Err(Error::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn ban_closes_open_tickets() {
        let (svc, _messenger) = service();
        let u = UserId(5);
        let t1 = svc.create_ticket(u, "Alice", "a", None).await.unwrap();
        let t2 = svc.create_ticket(u, "Alice", "b", None).await.unwrap();

        assert!(svc.set_banned(UserId(901), u, true).await.unwrap());
        assert!(svc.is_banned(u).await.unwrap());
        for id in [t1.id, t2.id] {
            let t = svc.find(&id).await.unwrap().unwrap();
            assert_eq!(t.status, TicketStatus::Closed);
        }

        assert!(!svc.set_banned(UserId(901), u, false).await.unwrap());
        assert!(!svc.is_banned(u).await.unwrap());
    }

    #[tokio::test]
    async fn track_user_creates_then_updates() {
        let (svc, _messenger) = service();
        let u = UserId(5);

        let first = svc.track_user(u, Some("Alice")).await.unwrap();
        assert_eq!(first.display_name.as_deref(), Some("Alice"));
        assert_eq!(first.ticket_count, 0);

        svc.create_ticket(u, "Alice", "Help", None).await.unwrap();
        let after = svc.track_user(u, Some("Alice B")).await.unwrap();
        assert_eq!(after.ticket_count, 1);
        assert_eq!(after.display_name.as_deref(), Some("Alice B"));
    }

    #[tokio::test]
    async fn spam_rejections_reach_the_event_log() {
        let (svc, _messenger) = service();

        svc.note_spam_rejection(UserId(5), "message");
        svc.note_spam_rejection(UserId(5), "callback");

        let log = std::fs::read_to_string(&svc.config().log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "spam_prevention");
        assert_eq!(first["level"], "warn");
        assert_eq!(first["data"]["user_id"], 5);
        assert_eq!(first["data"]["action"], "message");
    }

    #[test]
    fn lifetime_formatting() {
        assert_eq!(format_lifetime(30_000), "<1m");
        assert_eq!(format_lifetime(5 * 60_000), "5m");
        assert_eq!(format_lifetime(3 * 3_600_000 + 7 * 60_000), "3h 7m");
        assert_eq!(format_lifetime(49 * 3_600_000), "2d 1h");
    }
}
