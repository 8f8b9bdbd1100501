use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::{
    domain::{MessageRef, UserId},
    errors::Error,
    Result,
};

/// A one-shot action armed by a button tap, consumed by the next message
/// from the same user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingAction {
    /// A reply button was tapped; the next message is the reply body.
    Reply { ticket_id: String },
    /// Admin search: next message is a ticket id.
    SearchTicket,
    /// Admin search: next message is a user id.
    SearchUser,
}

/// The prompt message a reply draft must quote to be correlated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyPrompt {
    pub ticket_id: String,
    pub prompt: MessageRef,
}

#[derive(Clone, Debug, Default)]
struct SessionState {
    creating_ticket: bool,
    pending: Option<PendingAction>,
    reply_prompt: Option<ReplyPrompt>,
}

/// Read-only view of one user's session, handed to the message router.
#[derive(Clone, Debug, Default)]
pub struct SessionView {
    pub creating_ticket: bool,
    pub pending: Option<PendingAction>,
    pub reply_prompt: Option<ReplyPrompt>,
}

/// In-memory per-user interaction state. Ephemeral by design: a restart
/// drops drafts and prompts but never ticket data.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<UserId, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn view(&self, user_id: UserId) -> SessionView {
        let map = self.inner.lock().await;
        match map.get(&user_id) {
            Some(s) => SessionView {
                creating_ticket: s.creating_ticket,
                pending: s.pending.clone(),
                reply_prompt: s.reply_prompt.clone(),
            },
            None => SessionView::default(),
        }
    }

    /// Marks the user as composing a new ticket. Fails if one is already
    /// being composed so a double-tap cannot fork the flow.
    pub async fn begin_creation(&self, user_id: UserId) -> Result<()> {
        let mut map = self.inner.lock().await;
        let state = map.entry(user_id).or_default();
        if state.creating_ticket {
            return Err(Error::AlreadyInProgress(format!(
                "user {} is already composing a ticket",
                user_id.0
            )));
        }
        state.creating_ticket = true;
        Ok(())
    }

    /// Clears the composing flag. Returns whether it was set.
    pub async fn end_creation(&self, user_id: UserId) -> bool {
        let mut map = self.inner.lock().await;
        match map.get_mut(&user_id) {
            Some(s) => std::mem::take(&mut s.creating_ticket),
            None => false,
        }
    }

    pub async fn set_pending(&self, user_id: UserId, action: PendingAction) {
        let mut map = self.inner.lock().await;
        map.entry(user_id).or_default().pending = Some(action);
    }

    /// Removes and returns the armed one-shot action, if any.
    pub async fn take_pending(&self, user_id: UserId) -> Option<PendingAction> {
        let mut map = self.inner.lock().await;
        map.get_mut(&user_id).and_then(|s| s.pending.take())
    }

    /// Points the user's reply-by-quote shortcut at a new prompt message.
    /// The prompt stays armed until replaced, so quoting it routes to the
    /// same ticket every time.
    pub async fn set_reply_prompt(&self, user_id: UserId, prompt: ReplyPrompt) {
        let mut map = self.inner.lock().await;
        map.entry(user_id).or_default().reply_prompt = Some(prompt);
    }

    pub async fn clear(&self, user_id: UserId) {
        let mut map = self.inner.lock().await;
        map.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId};

    fn mref(m: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(-100),
            message_id: MessageId(m),
        }
    }

    #[tokio::test]
    async fn double_begin_creation_fails() {
        let store = SessionStore::new();
        let u = UserId(1);

        store.begin_creation(u).await.unwrap();
        assert!(matches!(
            store.begin_creation(u).await,
            Err(Error::AlreadyInProgress(_))
        ));
        assert!(store.end_creation(u).await);
        store.begin_creation(u).await.unwrap();
    }

    #[tokio::test]
    async fn pending_action_is_one_shot() {
        let store = SessionStore::new();
        let u = UserId(1);

        store.set_pending(u, PendingAction::SearchTicket).await;
        assert_eq!(store.take_pending(u).await, Some(PendingAction::SearchTicket));
        assert_eq!(store.take_pending(u).await, None);
    }

    #[tokio::test]
    async fn newer_reply_prompt_replaces_older() {
        let store = SessionStore::new();
        let u = UserId(7);

        store
            .set_reply_prompt(
                u,
                ReplyPrompt {
                    ticket_id: "ab12cd34".to_string(),
                    prompt: mref(10),
                },
            )
            .await;
        store
            .set_reply_prompt(
                u,
                ReplyPrompt {
                    ticket_id: "ef56ab78".to_string(),
                    prompt: mref(20),
                },
            )
            .await;

        let v = store.view(u).await;
        let prompt = v.reply_prompt.unwrap();
        assert_eq!(prompt.ticket_id, "ef56ab78");
        assert_eq!(prompt.prompt, mref(20));
    }

    #[tokio::test]
    async fn clear_drops_all_state() {
        let store = SessionStore::new();
        let u = UserId(1);

        store.begin_creation(u).await.unwrap();
        store.set_pending(u, PendingAction::SearchUser).await;
        store.clear(u).await;

        let v = store.view(u).await;
        assert!(!v.creating_ticket);
        assert!(v.pending.is_none());
    }
}
