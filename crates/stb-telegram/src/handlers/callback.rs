use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};

use stb_core::{
    domain::{ChatId, MessageId, MessageRef, Sender, Ticket, UserId},
    errors::Error,
    locales::LocaleStore,
    messaging::types::{InlineButton, InlineKeyboard},
    ratelimit::ActionClass,
    session::PendingAction,
    tickets::CloseReason,
};

use crate::router::AppState;

use super::{cancel_menu, commands};

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let data = q.data.clone().unwrap_or_default();
    let cb_id = q.id.clone();
    let user_id = UserId(q.from.id.0 as i64);
    let svc = &state.service;

    if data.is_empty() {
        let _ = state.messenger.answer_callback(&cb_id, None).await;
        return Ok(());
    }

    // Confirm/cancel taps settle a staged reply and are never throttled.
    let class = if data.starts_with("confirm_") {
        ActionClass::TicketCompletion
    } else {
        ActionClass::Callback
    };
    let allowed = {
        let mut gate = state.cooldowns.lock().await;
        gate.check(user_id, class).0
    };
    if !allowed {
        svc.note_spam_rejection(user_id, "callback");
        let text = svc.locales().resolve(None, "spam_cooldown_message", &[]);
        let _ = state.messenger.answer_callback(&cb_id, Some(&text)).await;
        return Ok(());
    }

    let is_admin = state.cfg.is_admin(user_id.0);
    if !is_admin && svc.is_banned(user_id).await.unwrap_or(false) {
        let _ = state.messenger.answer_callback(&cb_id, None).await;
        return Ok(());
    }

    let origin = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    let chat = origin.map(|m| m.chat_id).unwrap_or(ChatId(user_id.0));
    let lang_owned = svc.user_lang(user_id).await.unwrap_or(None);
    let lang = lang_owned.as_deref();

    let _ = state.messenger.answer_callback(&cb_id, None).await;

    if let Some(code) = data.strip_prefix("set_lang_") {
        set_language(&state, user_id, origin, code).await;
    } else if let Some(id) = data.strip_prefix("select_reply_") {
        select_reply(&state, user_id, chat, lang, id).await;
    } else if let Some(id) = data.strip_prefix("view_ticket_") {
        view_ticket(&state, user_id, is_admin, chat, lang, id).await;
    } else if let Some(id) = data.strip_prefix("admin_close_ticket_") {
        if is_admin {
            admin_close_ticket(&state, origin, chat, id).await;
        }
    } else if let Some(id) = data.strip_prefix("close_ticket_") {
        close_own_ticket(&state, user_id, is_admin, chat, lang, id).await;
    } else if data == "admin_search_ticket" {
        if is_admin {
            state.sessions.set_pending(user_id, PendingAction::SearchTicket).await;
            let text = svc.locales().resolve(None, "admin_search_ticket_prompt", &[]);
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
    } else if data == "admin_search_user" {
        if is_admin {
            state.sessions.set_pending(user_id, PendingAction::SearchUser).await;
            let text = svc.locales().resolve(None, "admin_search_user_prompt", &[]);
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
    } else if data == "admin_panel" {
        if is_admin {
            commands::send_admin_panel_to(&state, chat).await;
        }
    } else if let Some(id) = data.strip_prefix("admin_view_user_") {
        if is_admin {
            commands::show_user_card(&state, chat, None, id).await;
        }
    } else if let Some(id) = data.strip_prefix("admin_toggle_ban_") {
        if is_admin {
            toggle_ban(&state, user_id, chat, id).await;
        }
    } else if let Some(id) = data.strip_prefix("confirm_send_") {
        confirm_send(&state, origin, chat, id).await;
    } else if let Some(id) = data.strip_prefix("confirm_cancel_") {
        confirm_cancel(&state, origin, chat, id).await;
    }

    Ok(())
}

async fn set_language(
    state: &AppState,
    user_id: UserId,
    origin: Option<MessageRef>,
    code: &str,
) {
    let svc = &state.service;
    if !svc.locales().has_language(code) {
        return;
    }
    if let Err(err) = svc.set_language(user_id, code).await {
        tracing::error!(user_id = user_id.0, "language save failed: {err}");
        return;
    }
    if let Some(origin) = origin {
        let done = svc.locales().resolve(Some(code), "language_saved", &[]);
        let _ = state.messenger.edit_text(origin, &done).await;
    }
    commands::send_start(state, ChatId(user_id.0), user_id).await;
}

/// Arms the next private-chat message as a reply to the chosen ticket.
async fn select_reply(
    state: &AppState,
    user_id: UserId,
    chat: ChatId,
    lang: Option<&str>,
    id: &str,
) {
    let svc = &state.service;
    match svc.find(id).await {
        Ok(Some(ticket)) if ticket.user_id == user_id && ticket.is_open() => {
            state
                .sessions
                .set_pending(
                    user_id,
                    PendingAction::Reply {
                        ticket_id: ticket.id.clone(),
                    },
                )
                .await;
            let text = svc
                .locales()
                .resolve(lang, "write_to_ticket_prompt", &[("id", &ticket.id)]);
            let _ = state
                .messenger
                .send_reply_menu(chat, &text, cancel_menu(svc.locales(), lang))
                .await;
        }
        Ok(_) => {
            let text = svc
                .locales()
                .resolve(lang, "ticket_cannot_write", &[("id", id)]);
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
        Err(err) => tracing::error!(ticket_id = %id, "ticket lookup failed: {err}"),
    }
}

async fn view_ticket(
    state: &AppState,
    user_id: UserId,
    is_admin: bool,
    chat: ChatId,
    lang: Option<&str>,
    id: &str,
) {
    let svc = &state.service;
    let Some(ticket) = svc.find(id).await.ok().flatten() else {
        let text = svc.locales().resolve(lang, "ticket_not_found", &[]);
        let _ = state.messenger.send_text(chat, &text, None).await;
        return;
    };
    if ticket.user_id != user_id && !is_admin {
        return;
    }

    let text = render_history(svc.locales(), lang, &ticket);
    if ticket.is_open() && ticket.user_id == user_id {
        let keyboard = InlineKeyboard::new(vec![vec![InlineButton::new(
            svc.locales().resolve(lang, "button_close_ticket", &[]),
            format!("close_ticket_{}", ticket.id),
        )]]);
        let _ = state
            .messenger
            .send_with_keyboard(chat, &text, keyboard, None)
            .await;
    } else {
        let _ = state.messenger.send_text(chat, &text, None).await;
    }
}

async fn close_own_ticket(
    state: &AppState,
    user_id: UserId,
    is_admin: bool,
    chat: ChatId,
    lang: Option<&str>,
    id: &str,
) {
    let svc = &state.service;
    match svc.find(id).await {
        Ok(Some(ticket)) if ticket.user_id == user_id || is_admin => {
            match svc.close_ticket(&ticket.id, close_reason(&ticket, user_id)).await {
                // The service already notifies the user and posts the summary.
                Ok(_) => {}
                Err(Error::InvalidState(_)) => {
                    let text = svc
                        .locales()
                        .resolve(lang, "ticket_already_closed", &[("id", &ticket.id)]);
                    let _ = state.messenger.send_text(chat, &text, None).await;
                }
                Err(err) => tracing::error!(ticket_id = %ticket.id, "close failed: {err}"),
            }
        }
        Ok(_) => {
            let text = svc.locales().resolve(lang, "ticket_not_found", &[]);
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
        Err(err) => tracing::error!(ticket_id = %id, "ticket lookup failed: {err}"),
    }
}

async fn admin_close_ticket(
    state: &AppState,
    origin: Option<MessageRef>,
    chat: ChatId,
    id: &str,
) {
    let svc = &state.service;
    let text = match svc.close_ticket(id, CloseReason::Admin).await {
        Ok(ticket) => svc
            .locales()
            .resolve(None, "ticket_closed_ok", &[("id", &ticket.id)]),
        Err(Error::InvalidState(_)) => svc
            .locales()
            .resolve(None, "ticket_already_closed", &[("id", id)]),
        Err(Error::NotFound(_)) => svc.locales().resolve(None, "ticket_not_found", &[]),
        Err(err) => {
            tracing::error!(ticket_id = %id, "close failed: {err}");
            svc.locales().resolve(None, "generic_error", &[])
        }
    };
    match origin {
        Some(origin) => {
            let _ = state.messenger.edit_text(origin, &text).await;
        }
        None => {
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
    }
}

async fn toggle_ban(state: &AppState, actor: UserId, chat: ChatId, id: &str) {
    let svc = &state.service;
    let target = match id.parse::<i64>() {
        Ok(v) => UserId(v),
        Err(_) => return,
    };
    let banned = svc.is_banned(target).await.unwrap_or(false);
    let text = match svc.set_banned(actor, target, !banned).await {
        Ok(true) => svc
            .locales()
            .resolve(None, "user_banned_ok", &[("id", &target.0.to_string())]),
        Ok(false) => svc
            .locales()
            .resolve(None, "user_unbanned_ok", &[("id", &target.0.to_string())]),
        Err(Error::PermissionDenied(_)) => svc.locales().resolve(None, "main_admin_only", &[]),
        Err(err) => {
            tracing::error!(target = target.0, "ban toggle failed: {err}");
            svc.locales().resolve(None, "generic_error", &[])
        }
    };
    let _ = state.messenger.send_text(chat, &text, None).await;
}

async fn confirm_send(state: &AppState, origin: Option<MessageRef>, chat: ChatId, id: &str) {
    let svc = &state.service;
    let text = match state.confirmations.accept(svc, id).await {
        Ok(ticket_id) => svc
            .locales()
            .resolve(None, "confirm_sent", &[("id", &ticket_id)]),
        Err(Error::NotFound(_)) => svc.locales().resolve(None, "confirm_not_found", &[]),
        Err(Error::InvalidState(_)) => svc.locales().resolve(None, "confirm_ticket_closed", &[]),
        Err(err) => {
            tracing::error!(confirm_id = %id, "confirm send failed: {err}");
            svc.locales().resolve(None, "confirm_failed", &[])
        }
    };
    match origin {
        Some(origin) => {
            let _ = state.messenger.edit_text(origin, &text).await;
        }
        None => {
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
    }
}

async fn confirm_cancel(state: &AppState, origin: Option<MessageRef>, chat: ChatId, id: &str) {
    let svc = &state.service;
    let text = match state.confirmations.cancel(id).await {
        Ok(()) => svc.locales().resolve(None, "confirm_cancelled", &[]),
        Err(_) => svc.locales().resolve(None, "confirm_not_found", &[]),
    };
    match origin {
        Some(origin) => {
            let _ = state.messenger.edit_text(origin, &text).await;
        }
        None => {
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
    }
}

/// Owners close their own tickets; anyone else reaching this point is an
/// admin, and the terminal entry should say so.
fn close_reason(ticket: &Ticket, actor: UserId) -> CloseReason {
    if ticket.user_id == actor {
        CloseReason::User
    } else {
        CloseReason::Admin
    }
}

/// History display, marked so the router never mistakes a quote of it for a
/// ticket reference.
fn render_history(locales: &LocaleStore, lang: Option<&str>, ticket: &Ticket) -> String {
    let status = commands::status_label(locales, ticket);
    let mut out = locales.resolve(
        lang,
        "ticket_view_header",
        &[
            ("id", &ticket.id),
            ("status", &status),
            ("created", &super::format_ts(ticket.created_at)),
        ],
    );
    for entry in &ticket.history {
        let role_key = match entry.from {
            Sender::User => "role_user",
            Sender::Support => "role_support",
            Sender::System => "role_system",
        };
        let role = locales.resolve(lang, role_key, &[]);
        out.push_str(&format!("\n• {role}: {}", entry.content));
        if entry.attachment.is_some() {
            out.push_str(" 📎");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stb_core::domain::{ThreadId, TicketStatus};

    fn ticket_of(owner: UserId) -> Ticket {
        Ticket {
            id: "ab12cd34".to_string(),
            user_id: owner,
            display_name: "Alice".to_string(),
            status: TicketStatus::Open,
            thread_id: ThreadId(7),
            created_at: 0,
            history: vec![],
        }
    }

    #[test]
    fn close_by_owner_is_attributed_to_the_user() {
        let ticket = ticket_of(UserId(5));
        assert_eq!(close_reason(&ticket, UserId(5)), CloseReason::User);
    }

    #[test]
    fn close_by_someone_else_is_attributed_to_support() {
        let ticket = ticket_of(UserId(5));
        assert_eq!(close_reason(&ticket, UserId(900)), CloseReason::Admin);
    }
}
