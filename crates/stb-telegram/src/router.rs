use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;

use stb_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use stb_core::{
    config::Config, confirm::ConfirmationWorkflow, eventlog::EventLog, locales::LocaleStore,
    media::MediaStore, messaging::port::MessagingPort, ratelimit::CooldownGate,
    session::SessionStore, store::JsonCollection, tickets::TicketService,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<TicketService>,
    pub confirmations: Arc<ConfirmationWorkflow>,
    pub sessions: Arc<SessionStore>,
    pub cooldowns: Arc<Mutex<CooldownGate>>,
    pub messenger: Arc<dyn MessagingPort>,
}

pub async fn run_polling(cfg: Arc<Config>) -> stb_core::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = me.username(), "support bot started");
    }
    tracing::info!(
        support_group = cfg.support_group_id,
        admins = cfg.admin_ids.len(),
        "configuration loaded"
    );

    let locales = Arc::new(LocaleStore::load(&cfg.locales_dir, &cfg.default_lang)?);
    let events = Arc::new(EventLog::new(&cfg.log_path));

    // Wrap the raw Telegram messenger with a throttling decorator to reduce
    // 429s. We still keep a RetryAfter retry at the Telegram adapter layer.
    let raw_messenger: Arc<dyn MessagingPort> =
        Arc::new(TelegramMessenger::new(bot.clone(), cfg.support_group_id));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let service = Arc::new(TicketService::new(
        cfg.clone(),
        Arc::new(JsonCollection::new(&cfg.tickets_path)),
        Arc::new(JsonCollection::new(&cfg.users_path)),
        messenger.clone(),
        locales,
        MediaStore::new(&cfg.media_dir),
        events,
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        service,
        confirmations: Arc::new(ConfirmationWorkflow::new(cfg.confirm_ttl)),
        sessions: Arc::new(SessionStore::new()),
        cooldowns: Arc::new(Mutex::new(CooldownGate::new(
            cfg.message_cooldown,
            cfg.callback_cooldown,
            cfg.ticket_create_cooldown,
            cfg.admin_ids.clone(),
        ))),
        messenger,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
