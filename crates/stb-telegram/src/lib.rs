//! Telegram adapter (teloxide).
//!
//! This crate implements the `stb-core` MessagingPort over the Telegram Bot
//! API. Ticket threads map onto forum topics in the support supergroup.

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use stb_core::{
    domain::{Attachment, AttachmentKind, ChatId, MessageId, MessageRef, ThreadId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, ReplyMenu},
    },
    Result,
};

/// Default forum-topic icon color (Telegram's blue).
const TOPIC_ICON_COLOR: u32 = 0x6FB9F0;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    /// Forum-enabled supergroup that hosts ticket threads.
    support_group: teloxide::types::ChatId,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, support_group_id: i64) -> Self {
        Self {
            bot,
            support_group: teloxide::types::ChatId(support_group_id),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Relay(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

fn inline_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn reply_markup(menu: ReplyMenu) -> KeyboardMarkup {
    let rows: Vec<Vec<KeyboardButton>> = menu
        .rows
        .into_iter()
        .map(|row| row.into_iter().map(KeyboardButton::new).collect())
        .collect();
    KeyboardMarkup::new(rows).resize_keyboard(true)
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let mut req = self.bot.send_message(Self::tg_chat(chat_id), text.to_string());
                if let Some(t) = thread {
                    req = req.message_thread_id(t.0);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: &Attachment,
        caption: Option<&str>,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        let chat = Self::tg_chat(chat_id);
        let file = InputFile::file_id(attachment.external_ref.clone());
        let caption = caption.map(str::to_string);

        let msg = match attachment.kind {
            AttachmentKind::Photo => {
                self.with_retry(|| {
                    let mut req = self.bot.send_photo(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t.0);
                    }
                    req
                })
                .await?
            }
            AttachmentKind::Document => {
                self.with_retry(|| {
                    let mut req = self.bot.send_document(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t.0);
                    }
                    req
                })
                .await?
            }
            AttachmentKind::Animation => {
                self.with_retry(|| {
                    let mut req = self.bot.send_animation(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t.0);
                    }
                    req
                })
                .await?
            }
            AttachmentKind::Video => {
                self.with_retry(|| {
                    let mut req = self.bot.send_video(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t.0);
                    }
                    req
                })
                .await?
            }
        };

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        let markup = inline_markup(keyboard);
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .reply_markup(markup.clone());
                if let Some(t) = thread {
                    req = req.message_thread_id(t.0);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_reply_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        menu: ReplyMenu,
    ) -> Result<MessageRef> {
        let markup = reply_markup(menu);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .reply_markup(markup.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
        })
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn create_thread(&self, name: &str) -> Result<ThreadId> {
        let topic = self
            .with_retry(|| {
                self.bot.create_forum_topic(
                    self.support_group,
                    name.to_string(),
                    TOPIC_ICON_COLOR,
                    String::new(),
                )
            })
            .await?;
        Ok(ThreadId(topic.message_thread_id))
    }

    async fn delete_thread(&self, thread: ThreadId) -> Result<()> {
        self.with_retry(|| self.bot.delete_forum_topic(self.support_group, thread.0))
            .await?;
        Ok(())
    }

    async fn fetch_attachment(&self, external_ref: &str) -> Result<Vec<u8>> {
        let file = self
            .with_retry(|| self.bot.get_file(external_ref.to_string()))
            .await?;

        // teloxide downloads into an AsyncWrite; go through a temp file.
        let tmp = std::env::temp_dir().join(format!(
            "stb-dl-{}-{}",
            std::process::id(),
            unique_suffix()
        ));
        let mut dst = tokio::fs::File::create(&tmp).await?;
        let downloaded = self.bot.download_file(&file.path, &mut dst).await;
        drop(dst);

        let out = match downloaded {
            Ok(()) => tokio::fs::read(&tmp).await.map_err(Error::Io),
            Err(e) => Err(Error::External(format!("telegram download error: {e}"))),
        };
        let _ = tokio::fs::remove_file(&tmp).await;
        out
    }
}

fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
