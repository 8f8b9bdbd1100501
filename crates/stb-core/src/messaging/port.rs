use async_trait::async_trait;

use crate::{
    domain::{Attachment, ChatId, MessageRef, ThreadId},
    messaging::types::{InlineKeyboard, ReplyMenu},
    Result,
};

/// Cross-messenger transport port.
///
/// Telegram is the first implementation; thread operations map onto forum
/// topics there. The `thread` argument targets a support-group thread and is
/// `None` for direct chats.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef>;

    async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: &Attachment,
        caption: Option<&str>,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef>;

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef>;

    async fn send_reply_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        menu: ReplyMenu,
    ) -> Result<MessageRef>;

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    /// Creates a new support-group thread for a ticket.
    async fn create_thread(&self, name: &str) -> Result<ThreadId>;

    /// Removes a ticket's thread. Callers treat failure as non-fatal.
    async fn delete_thread(&self, thread: ThreadId) -> Result<()>;

    /// Downloads the raw bytes behind a transport file reference.
    async fn fetch_attachment(&self, external_ref: &str) -> Result<Vec<u8>>;
}
