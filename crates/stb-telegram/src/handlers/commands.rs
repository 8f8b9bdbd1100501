use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use stb_core::{
    domain::{ChatId, ThreadId, Ticket, UserId},
    locales::LocaleStore,
    messaging::types::{InlineButton, InlineKeyboard},
    session::PendingAction,
};

use crate::router::AppState;

use super::{cancel_menu, format_ts, main_menu};

pub(crate) fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MenuAction {
    CreateTicket,
    MyTickets,
    WriteToTicket,
    Cancel,
}

/// Matches a message against the reply-menu button labels of every loaded
/// language, so a user who switched languages mid-menu still lands on the
/// right action.
pub(crate) fn match_menu_button(locales: &LocaleStore, text: &str) -> Option<MenuAction> {
    let text = text.trim();
    for lang in locales.available() {
        let lang = Some(lang);
        if text == locales.resolve(lang, "button_create_ticket", &[]) {
            return Some(MenuAction::CreateTicket);
        }
        if text == locales.resolve(lang, "button_my_tickets", &[]) {
            return Some(MenuAction::MyTickets);
        }
        if text == locales.resolve(lang, "button_write_to_ticket", &[]) {
            return Some(MenuAction::WriteToTicket);
        }
        if text == locales.resolve(lang, "button_cancel", &[]) {
            return Some(MenuAction::Cancel);
        }
    }
    None
}

pub(crate) async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(tg_user) = msg.from() else {
        return Ok(());
    };
    let user_id = UserId(tg_user.id.0 as i64);
    let chat = ChatId(msg.chat.id.0);

    let (cmd, _args) = parse_command(msg.text().unwrap_or_default());
    match cmd.as_str() {
        "start" => send_start(&state, chat, user_id).await,
        "lang" | "language" => send_language_menu(&state, chat).await,
        // Unknown commands are dropped; the reply menu is the real surface.
        _ => {}
    }
    Ok(())
}

pub(crate) async fn send_start(state: &AppState, chat: ChatId, user_id: UserId) {
    let svc = &state.service;
    let lang_owned = svc.user_lang(user_id).await.unwrap_or(None);
    if lang_owned.is_none() {
        send_language_menu(state, chat).await;
        return;
    }
    let lang = lang_owned.as_deref();
    let text = svc.locales().resolve(lang, "start_message", &[]);
    let _ = state
        .messenger
        .send_reply_menu(chat, &text, main_menu(svc.locales(), lang))
        .await;
}

pub(crate) async fn send_language_menu(state: &AppState, chat: ChatId) {
    let svc = &state.service;
    let buttons: Vec<InlineButton> = svc
        .locales()
        .available()
        .into_iter()
        .map(|code| {
            InlineButton::new(
                svc.locales().resolve(Some(code), "language_name", &[]),
                format!("set_lang_{code}"),
            )
        })
        .collect();
    let text = svc.locales().resolve(None, "language_select_prompt", &[]);
    let _ = state
        .messenger
        .send_with_keyboard(chat, &text, InlineKeyboard::new(vec![buttons]), None)
        .await;
}

pub(crate) async fn handle_menu_button(
    msg: Message,
    state: Arc<AppState>,
    action: MenuAction,
) -> ResponseResult<()> {
    let Some(tg_user) = msg.from() else {
        return Ok(());
    };
    let svc = &state.service;
    let user_id = UserId(tg_user.id.0 as i64);
    let chat = ChatId(msg.chat.id.0);
    let lang_owned = svc.user_lang(user_id).await.unwrap_or(None);
    let lang = lang_owned.as_deref();

    match action {
        MenuAction::CreateTicket => {
            let key = match state.sessions.begin_creation(user_id).await {
                Ok(()) => "create_ticket_prompt",
                Err(_) => "create_ticket_active_error",
            };
            let text = svc.locales().resolve(lang, key, &[]);
            let _ = state
                .messenger
                .send_reply_menu(chat, &text, cancel_menu(svc.locales(), lang))
                .await;
        }
        MenuAction::Cancel => {
            let was_creating = state.sessions.end_creation(user_id).await;
            let had_pending = state.sessions.take_pending(user_id).await.is_some();
            let key = if was_creating || had_pending {
                "cancel_success"
            } else {
                "cancel_nothing"
            };
            let text = svc.locales().resolve(lang, key, &[]);
            let _ = state
                .messenger
                .send_reply_menu(chat, &text, main_menu(svc.locales(), lang))
                .await;
        }
        MenuAction::MyTickets => {
            let tickets = svc.tickets_for(user_id).await.unwrap_or_default();
            if tickets.is_empty() {
                let text = svc.locales().resolve(lang, "my_tickets_none", &[]);
                let _ = state
                    .messenger
                    .send_reply_menu(chat, &text, main_menu(svc.locales(), lang))
                    .await;
                return Ok(());
            }
            let open = tickets.iter().filter(|t| t.is_open()).count();
            let text = svc.locales().resolve(
                lang,
                "my_tickets_summary",
                &[
                    ("total", &tickets.len().to_string()),
                    ("open", &open.to_string()),
                    ("closed", &(tickets.len() - open).to_string()),
                ],
            );
            let buttons: Vec<InlineButton> = tickets
                .iter()
                .take(10)
                .map(|t| ticket_button(svc.locales(), lang, t, "view_ticket_"))
                .collect();
            let _ = state
                .messenger
                .send_with_keyboard(chat, &text, InlineKeyboard::one_per_row(buttons), None)
                .await;
        }
        MenuAction::WriteToTicket => {
            let open = svc.open_tickets_for(user_id).await.unwrap_or_default();
            match open.as_slice() {
                [] => {
                    let text = svc.locales().resolve(lang, "write_to_ticket_no_open", &[]);
                    let _ = state
                        .messenger
                        .send_reply_menu(chat, &text, main_menu(svc.locales(), lang))
                        .await;
                }
                [only] => {
                    state
                        .sessions
                        .set_pending(
                            user_id,
                            PendingAction::Reply {
                                ticket_id: only.id.clone(),
                            },
                        )
                        .await;
                    let text = svc
                        .locales()
                        .resolve(lang, "write_to_ticket_prompt", &[("id", &only.id)]);
                    let _ = state
                        .messenger
                        .send_reply_menu(chat, &text, cancel_menu(svc.locales(), lang))
                        .await;
                }
                many => {
                    let text = svc.locales().resolve(lang, "write_to_ticket_select", &[]);
                    let buttons: Vec<InlineButton> = many
                        .iter()
                        .map(|t| ticket_button(svc.locales(), lang, t, "select_reply_"))
                        .collect();
                    let _ = state
                        .messenger
                        .send_with_keyboard(chat, &text, InlineKeyboard::one_per_row(buttons), None)
                        .await;
                }
            }
        }
    }
    Ok(())
}

fn ticket_button(
    locales: &LocaleStore,
    lang: Option<&str>,
    ticket: &Ticket,
    prefix: &str,
) -> InlineButton {
    let key = if ticket.is_open() {
        "ticket_button_open"
    } else {
        "ticket_button_closed"
    };
    InlineButton::new(
        locales.resolve(lang, key, &[("id", &ticket.id)]),
        format!("{prefix}{}", ticket.id),
    )
}

// ---------- admin panel ----------

pub(crate) async fn send_admin_panel(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(tg_user) = msg.from() else {
        return Ok(());
    };
    if !state.cfg.is_admin(tg_user.id.0 as i64) {
        return Ok(());
    }
    send_admin_panel_to(&state, ChatId(msg.chat.id.0)).await;
    Ok(())
}

pub(crate) async fn send_admin_panel_to(state: &AppState, chat: ChatId) {
    let svc = &state.service;
    let stats = match svc.stats().await {
        Ok(stats) => stats,
        Err(err) => {
            tracing::error!("stats failed: {err}");
            return;
        }
    };
    let text = svc.locales().resolve(
        None,
        "admin_panel",
        &[
            ("open", &stats.open_tickets.to_string()),
            ("total", &stats.total_tickets.to_string()),
            ("users", &stats.users.to_string()),
            ("banned", &stats.banned_users.to_string()),
        ],
    );
    let keyboard = InlineKeyboard::new(vec![
        vec![InlineButton::new(
            svc.locales().resolve(None, "button_search_ticket", &[]),
            "admin_search_ticket",
        )],
        vec![InlineButton::new(
            svc.locales().resolve(None, "button_search_user", &[]),
            "admin_search_user",
        )],
    ]);
    let _ = state
        .messenger
        .send_with_keyboard(chat, &text, keyboard, None)
        .await;
}

/// Admin ticket lookup result: card plus close / owner shortcuts.
pub(crate) async fn show_ticket_card(
    state: &AppState,
    chat: ChatId,
    thread: Option<ThreadId>,
    query: &str,
) {
    let svc = &state.service;
    let Some(ticket) = svc.find(query).await.ok().flatten() else {
        let text = svc.locales().resolve(None, "admin_ticket_not_found", &[]);
        let _ = state.messenger.send_text(chat, &text, thread).await;
        return;
    };

    let status = status_label(svc.locales(), &ticket);
    let text = svc.locales().resolve(
        None,
        "admin_ticket_info",
        &[
            ("id", &ticket.id),
            ("name", &ticket.display_name),
            ("user_id", &ticket.user_id.0.to_string()),
            ("status", &status),
            ("created", &format_ts(ticket.created_at)),
            ("count", &ticket.history.len().to_string()),
        ],
    );

    let mut keyboard = InlineKeyboard::default();
    if ticket.is_open() {
        keyboard = keyboard.row(vec![InlineButton::new(
            svc.locales().resolve(None, "button_close_ticket", &[]),
            format!("admin_close_ticket_{}", ticket.id),
        )]);
    }
    keyboard = keyboard.row(vec![InlineButton::new(
        svc.locales().resolve(None, "button_view_user", &[]),
        format!("admin_view_user_{}", ticket.user_id.0),
    )]);

    let _ = state
        .messenger
        .send_with_keyboard(chat, &text, keyboard, thread)
        .await;
}

/// Admin user lookup result: card plus the ban toggle.
pub(crate) async fn show_user_card(
    state: &AppState,
    chat: ChatId,
    thread: Option<ThreadId>,
    query: &str,
) {
    let svc = &state.service;
    let target = match query.trim().trim_start_matches('@').parse::<i64>() {
        Ok(id) => UserId(id),
        Err(_) => {
            let text = svc.locales().resolve(None, "admin_user_not_found", &[]);
            let _ = state.messenger.send_text(chat, &text, thread).await;
            return;
        }
    };
    let Some(user) = svc.user(target).await.ok().flatten() else {
        let text = svc.locales().resolve(None, "admin_user_not_found", &[]);
        let _ = state.messenger.send_text(chat, &text, thread).await;
        return;
    };

    let tickets = svc.tickets_for(target).await.unwrap_or_default();
    let open = tickets.iter().filter(|t| t.is_open()).count();
    let status_key = if user.banned {
        "status_banned"
    } else {
        "status_active"
    };
    let text = svc.locales().resolve(
        None,
        "admin_user_info",
        &[
            ("id", &target.0.to_string()),
            ("name", user.display_name.as_deref().unwrap_or("-")),
            ("status", &svc.locales().resolve(None, status_key, &[])),
            ("registered", &format_ts(user.registered_at)),
            ("last_activity", &format_ts(user.last_activity_at)),
            ("total", &tickets.len().to_string()),
            ("open", &open.to_string()),
        ],
    );

    let toggle_key = if user.banned { "button_unban" } else { "button_ban" };
    let keyboard = InlineKeyboard::new(vec![vec![InlineButton::new(
        svc.locales().resolve(None, toggle_key, &[]),
        format!("admin_toggle_ban_{}", target.0),
    )]]);

    let _ = state
        .messenger
        .send_with_keyboard(chat, &text, keyboard, thread)
        .await;
}

pub(crate) fn status_label(locales: &LocaleStore, ticket: &Ticket) -> String {
    let key = if ticket.is_open() {
        "status_open"
    } else {
        "status_closed"
    };
    locales.resolve(None, key, &[])
}
