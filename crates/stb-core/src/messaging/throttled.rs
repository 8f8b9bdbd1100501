use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{Attachment, ChatId, MessageRef, ThreadId},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, ReplyMenu},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Floor between any two outbound calls, whatever the destination.
    pub global_min_interval: Duration,
    /// Floor between two calls into the same chat. Telegram allows roughly
    /// one message per second per chat before it starts returning 429s.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Earliest instant the next call behind this pacer may start.
#[derive(Debug)]
struct Pacer {
    gap: Duration,
    ready_at: Instant,
}

impl Pacer {
    fn new(gap: Duration) -> Self {
        Self {
            gap,
            ready_at: Instant::now(),
        }
    }

    /// Claims the next send slot; the caller sleeps for the returned wait.
    fn claim(&mut self) -> Duration {
        let now = Instant::now();
        let wait = self.ready_at.saturating_duration_since(now);
        self.ready_at = now + wait + self.gap;
        wait
    }
}

/// MessagingPort decorator that paces outbound calls.
///
/// Relays, close notices and summaries fan out in bursts when a ticket is
/// busy; spacing the calls keeps most of them under Telegram's flood limits,
/// and the adapter's retry handling absorbs whatever still slips through.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<Pacer>,
    chats: Mutex<HashMap<i64, Arc<Mutex<Pacer>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(Pacer::new(cfg.global_min_interval)),
            chats: Mutex::new(HashMap::new()),
        }
    }

    async fn chat_pacer(&self, chat_id: i64) -> Arc<Mutex<Pacer>> {
        let mut map = self.chats.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(Pacer::new(self.cfg.per_chat_min_interval))))
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = self.global.lock().await.claim();
        let pacer = self.chat_pacer(chat_id).await;
        let chat_wait = pacer.lock().await.claim();

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = self.global.lock().await.claim();
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_text(chat_id, text, thread).await
    }

    async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: &Attachment,
        caption: Option<&str>,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner
            .send_attachment(chat_id, attachment, caption, thread)
            .await
    }

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
        thread: Option<ThreadId>,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner
            .send_with_keyboard(chat_id, text, keyboard, thread)
            .await
    }

    async fn send_reply_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        menu: ReplyMenu,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_reply_menu(chat_id, text, menu).await
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.edit_text(msg, text).await
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // No chat_id available here; apply global throttling only.
        self.throttle_global().await;
        self.inner.answer_callback(callback_id, text).await
    }

    async fn create_thread(&self, name: &str) -> Result<ThreadId> {
        self.throttle_global().await;
        self.inner.create_thread(name).await
    }

    async fn delete_thread(&self, thread: ThreadId) -> Result<()> {
        self.throttle_global().await;
        self.inner.delete_thread(thread).await
    }

    async fn fetch_attachment(&self, external_ref: &str) -> Result<Vec<u8>> {
        self.throttle_global().await;
        self.inner.fetch_attachment(external_ref).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingMessenger {
        sent: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MessagingPort for CountingMessenger {
        async fn send_text(
            &self,
            chat_id: ChatId,
            _text: &str,
            _thread: Option<ThreadId>,
        ) -> Result<MessageRef> {
            let n = self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(MessageRef {
                chat_id,
                message_id: crate::domain::MessageId(n as i32),
            })
        }

        async fn send_attachment(
            &self,
            chat_id: ChatId,
            _attachment: &Attachment,
            _caption: Option<&str>,
            _thread: Option<ThreadId>,
        ) -> Result<MessageRef> {
            self.send_text(chat_id, "", None).await
        }

        async fn send_with_keyboard(
            &self,
            chat_id: ChatId,
            _text: &str,
            _keyboard: InlineKeyboard,
            _thread: Option<ThreadId>,
        ) -> Result<MessageRef> {
            self.send_text(chat_id, "", None).await
        }

        async fn send_reply_menu(
            &self,
            chat_id: ChatId,
            _text: &str,
            _menu: ReplyMenu,
        ) -> Result<MessageRef> {
            self.send_text(chat_id, "", None).await
        }

        async fn edit_text(&self, _msg: MessageRef, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn answer_callback(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
            Ok(())
        }

        async fn create_thread(&self, _name: &str) -> Result<ThreadId> {
            Ok(ThreadId(1))
        }

        async fn delete_thread(&self, _thread: ThreadId) -> Result<()> {
            Ok(())
        }

        async fn fetch_attachment(&self, _external_ref: &str) -> Result<Vec<u8>> {
            Ok(vec![])
        }
    }

    #[test]
    fn pacer_spaces_consecutive_claims() {
        let mut pacer = Pacer::new(Duration::from_millis(100));
        assert!(pacer.claim().is_zero());
        let second = pacer.claim();
        assert!(second > Duration::from_millis(90));
        assert!(second <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn passes_calls_through_and_spaces_per_chat() {
        let inner = Arc::new(CountingMessenger {
            sent: AtomicUsize::new(0),
        });
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(0),
                per_chat_min_interval: Duration::from_millis(20),
            },
        );

        let before = Instant::now();
        throttled.send_text(ChatId(1), "a", None).await.unwrap();
        throttled.send_text(ChatId(1), "b", None).await.unwrap();
        let elapsed = before.elapsed();

        assert_eq!(inner.sent.load(Ordering::SeqCst), 2);
        assert!(elapsed >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn different_chats_do_not_block_each_other() {
        let inner = Arc::new(CountingMessenger {
            sent: AtomicUsize::new(0),
        });
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(0),
                per_chat_min_interval: Duration::from_millis(250),
            },
        );

        let before = Instant::now();
        throttled.send_text(ChatId(1), "a", None).await.unwrap();
        throttled.send_text(ChatId(2), "b", None).await.unwrap();
        let elapsed = before.elapsed();

        assert_eq!(inner.sent.load(Ordering::SeqCst), 2);
        assert!(elapsed < Duration::from_millis(200));
    }
}
