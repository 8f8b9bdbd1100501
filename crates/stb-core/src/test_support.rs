//! Shared fixtures for crate tests.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{Attachment, ChatId, MessageId, MessageRef, ThreadId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, ReplyMenu},
    },
    Result,
};

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub thread: Option<ThreadId>,
    pub text: String,
}

/// In-memory MessagingPort that records everything it is asked to send.
#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<SentMessage>>,
    pub threads_created: Mutex<Vec<String>>,
    pub threads_deleted: Mutex<Vec<ThreadId>>,
    pub fail_sends: AtomicBool,
    next_message_id: AtomicI32,
    next_thread_id: AtomicI32,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|m| m.text.clone()).collect()
    }

    async fn record(
        &self,
        chat_id: ChatId,
        thread: Option<ThreadId>,
        text: &str,
    ) -> Result<MessageRef> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Relay("fake send failure".to_string()));
        }
        self.sent.lock().await.push(SentMessage {
            chat_id,
            thread,
            text: text.to_string(),
        });
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(id),
        })
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        self.record(chat_id, thread, text).await
    }

    async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: &Attachment,
        caption: Option<&str>,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        let text = format!(
            "[{:?}:{}] {}",
            attachment.kind,
            attachment.external_ref,
            caption.unwrap_or_default()
        );
        self.record(chat_id, thread, &text).await
    }

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        _keyboard: InlineKeyboard,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        self.record(chat_id, thread, text).await
    }

    async fn send_reply_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        _menu: ReplyMenu,
    ) -> Result<MessageRef> {
        self.record(chat_id, None, text).await
    }

    async fn edit_text(&self, _msg: MessageRef, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn create_thread(&self, name: &str) -> Result<ThreadId> {
        self.threads_created.lock().await.push(name.to_string());
        let id = self.next_thread_id.fetch_add(1, Ordering::SeqCst) + 100;
        Ok(ThreadId(id))
    }

    async fn delete_thread(&self, thread: ThreadId) -> Result<()> {
        self.threads_deleted.lock().await.push(thread);
        Ok(())
    }

    async fn fetch_attachment(&self, _external_ref: &str) -> Result<Vec<u8>> {
        Ok(b"fake-bytes".to_vec())
    }
}

/// Unique temp path for file-backed fixtures.
pub fn tmp_path(prefix: &str, ext: &str) -> std::path::PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::path::PathBuf::from(format!("/tmp/{prefix}-{}-{ts}.{ext}", std::process::id()))
}
