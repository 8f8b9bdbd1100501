use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use stb_core::{
    domain::{Attachment, AttachmentKind, ChatId, MessageId, MessageRef, ThreadId, UserId},
    errors::Error,
    messaging::types::{InlineButton, InlineKeyboard},
    ratelimit::ActionClass,
    router::{classify, InboundMessage, ReplyTarget, RoutedAction},
    session::ReplyPrompt,
    tickets::CloseReason,
};

use crate::router::AppState;

use super::{commands, display_name, main_menu};

/// In-thread shorthand for closing the ticket without a button.
const CLOSE_ALIASES: &[&str] = &["/close", "close", "/c", "/з", "закрыть"];
const BAN_ALIASES: &[&str] = &["/ban", "ban", "/b", "/б", "бан"];

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(tg_user) = msg.from() else {
        return Ok(());
    };
    if tg_user.is_bot {
        return Ok(());
    }

    let svc = &state.service;
    let user_id = UserId(tg_user.id.0 as i64);
    let name = display_name(tg_user);

    if let Err(err) = svc.track_user(user_id, Some(&name)).await {
        tracing::warn!(user_id = user_id.0, "user tracking failed: {err}");
    }

    let is_admin = state.cfg.is_admin(user_id.0);
    if !is_admin && svc.is_banned(user_id).await.unwrap_or(false) {
        return Ok(());
    }

    let lang_owned = svc.user_lang(user_id).await.unwrap_or(None);
    let lang = lang_owned.as_deref();

    let allowed = {
        let mut gate = state.cooldowns.lock().await;
        gate.check(user_id, ActionClass::Message).0
    };
    if !allowed {
        svc.note_spam_rejection(user_id, "message");
        if msg.chat.is_private() {
            let text = svc.locales().resolve(lang, "spam_cooldown_message", &[]);
            let _ = state
                .messenger
                .send_text(ChatId(msg.chat.id.0), &text, None)
                .await;
        }
        return Ok(());
    }

    if msg.chat.is_private() {
        if let Some(text) = msg.text() {
            if text.starts_with('/') {
                return commands::handle_command(msg, state).await;
            }
            if let Some(action) = commands::match_menu_button(svc.locales(), text) {
                return commands::handle_menu_button(msg, state, action).await;
            }
        }
    } else if msg.chat.id.0 == state.cfg.support_group_id && msg.thread_id.is_none() {
        // The admin panel lives in the support group root, never in a topic.
        if let Some(text) = msg.text() {
            if text.starts_with('/') && commands::parse_command(text).0 == "admin" {
                return commands::send_admin_panel(msg, state).await;
            }
        }
    }

    let inbound = inbound_from(&msg);
    let session = state.sessions.view(user_id).await;
    let tickets = match svc.snapshot().await {
        Ok(map) => map,
        Err(err) => {
            tracing::error!("ticket snapshot failed: {err}");
            return Ok(());
        }
    };
    let action = classify(
        &inbound,
        &session,
        &tickets,
        ChatId(state.cfg.support_group_id),
    );

    let chat = ChatId(msg.chat.id.0);
    let attachment = extract_attachment(&msg);
    let content = inbound.content().unwrap_or_default().to_string();

    match action {
        RoutedAction::UserReply { ticket_id } => {
            state.sessions.take_pending(user_id).await;
            match svc.append_user_entry(&ticket_id, &content, attachment).await {
                Ok(()) => {
                    let text = svc.locales().resolve(lang, "reply_sent", &[("id", &ticket_id)]);
                    let _ = state
                        .messenger
                        .send_reply_menu(chat, &text, main_menu(svc.locales(), lang))
                        .await;
                }
                Err(Error::NotFound(_)) | Err(Error::InvalidState(_)) => {
                    let text =
                        svc.locales()
                            .resolve(lang, "ticket_cannot_write", &[("id", &ticket_id)]);
                    let _ = state.messenger.send_text(chat, &text, None).await;
                }
                Err(err) => {
                    tracing::error!(ticket_id = %ticket_id, "user reply failed: {err}");
                    let text = svc.locales().resolve(lang, "generic_error", &[]);
                    let _ = state.messenger.send_text(chat, &text, None).await;
                }
            }
        }
        RoutedAction::SupportReply { ticket_id } => {
            state.sessions.take_pending(user_id).await;
            support_reply(&state, user_id, chat, &inbound, &ticket_id, &content, attachment).await;
        }
        RoutedAction::SearchTicket { query } => {
            state.sessions.take_pending(user_id).await;
            if is_admin {
                commands::show_ticket_card(&state, chat, inbound.thread_id, &query).await;
            }
        }
        RoutedAction::SearchUser { query } => {
            state.sessions.take_pending(user_id).await;
            if is_admin {
                commands::show_user_card(&state, chat, inbound.thread_id, &query).await;
            }
        }
        RoutedAction::OpenNewTicket => {
            open_new_ticket(&state, user_id, chat, &name, lang, &content, attachment).await;
        }
        RoutedAction::Ignore => {}
    }

    Ok(())
}

/// Support-side message inside a ticket thread: shorthand close/ban commands,
/// otherwise a reply draft staged behind the confirmation workflow.
async fn support_reply(
    state: &AppState,
    actor: UserId,
    chat: ChatId,
    inbound: &InboundMessage,
    ticket_id: &str,
    content: &str,
    attachment: Option<Attachment>,
) {
    let svc = &state.service;
    let thread = inbound.thread_id;
    let shorthand = content.trim().to_lowercase();

    if CLOSE_ALIASES.contains(&shorthand.as_str()) {
        match svc.close_ticket(ticket_id, CloseReason::Admin).await {
            // The closure summary lands in the group root; nothing else to say.
            Ok(_) => {}
            Err(Error::InvalidState(_)) => {
                let text =
                    svc.locales()
                        .resolve(None, "ticket_already_closed", &[("id", ticket_id)]);
                let _ = state.messenger.send_text(chat, &text, thread).await;
            }
            Err(err) => tracing::error!(ticket_id = %ticket_id, "close failed: {err}"),
        }
        return;
    }

    if BAN_ALIASES.contains(&shorthand.as_str()) {
        let target = match svc.find(ticket_id).await {
            Ok(Some(ticket)) => ticket.user_id,
            _ => return,
        };
        let text = match svc.set_banned(actor, target, true).await {
            Ok(_) => svc.locales().resolve(
                None,
                "user_banned_ok",
                &[("id", &target.0.to_string())],
            ),
            Err(Error::PermissionDenied(_)) => {
                svc.locales().resolve(None, "main_admin_only", &[])
            }
            Err(err) => {
                tracing::error!(ticket_id = %ticket_id, "ban failed: {err}");
                svc.locales().resolve(None, "generic_error", &[])
            }
        };
        let _ = state.messenger.send_text(chat, &text, thread).await;
        return;
    }

    let quoted = inbound.reply_to.as_ref().and_then(|r| r.text.as_deref());
    match state
        .confirmations
        .stage(svc, ticket_id, content, attachment, quoted)
        .await
    {
        Ok(staged) => {
            let keyboard = InlineKeyboard::new(vec![vec![
                InlineButton::new(
                    svc.locales().resolve(None, "button_confirm_send", &[]),
                    format!("confirm_send_{}", staged.confirm_id),
                ),
                InlineButton::new(
                    svc.locales().resolve(None, "button_confirm_cancel", &[]),
                    format!("confirm_cancel_{}", staged.confirm_id),
                ),
            ]]);
            let _ = state
                .messenger
                .send_with_keyboard(chat, &staged.preview, keyboard, thread)
                .await;
        }
        Err(Error::NotFound(_)) | Err(Error::InvalidState(_)) => {
            let text = svc
                .locales()
                .resolve(None, "ticket_cannot_write", &[("id", ticket_id)]);
            let _ = state.messenger.send_text(chat, &text, thread).await;
        }
        Err(err) => tracing::error!(ticket_id = %ticket_id, "staging failed: {err}"),
    }
}

async fn open_new_ticket(
    state: &AppState,
    user_id: UserId,
    chat: ChatId,
    name: &str,
    lang: Option<&str>,
    content: &str,
    attachment: Option<Attachment>,
) {
    let svc = &state.service;

    let (allowed, retry_in) = {
        let mut gate = state.cooldowns.lock().await;
        gate.check(user_id, ActionClass::TicketCreate)
    };
    if !allowed {
        svc.note_spam_rejection(user_id, "ticket_create");
        let seconds = retry_in.map(|d| d.as_secs().max(1)).unwrap_or(1).to_string();
        let text = svc
            .locales()
            .resolve(lang, "create_cooldown_message", &[("seconds", &seconds)]);
        let _ = state.messenger.send_text(chat, &text, None).await;
        return;
    }

    state.sessions.end_creation(user_id).await;

    match svc.create_ticket(user_id, name, content, attachment).await {
        Ok(ticket) => {
            let text = svc
                .locales()
                .resolve(lang, "ticket_created", &[("id", &ticket.id)]);
            match state
                .messenger
                .send_reply_menu(chat, &text, main_menu(svc.locales(), lang))
                .await
            {
                // Quoting the confirmation later appends to this ticket.
                Ok(sent) => {
                    state
                        .sessions
                        .set_reply_prompt(
                            user_id,
                            ReplyPrompt {
                                ticket_id: ticket.id.clone(),
                                prompt: sent,
                            },
                        )
                        .await;
                }
                Err(err) => tracing::warn!(ticket_id = %ticket.id, "confirmation send failed: {err}"),
            }
        }
        Err(Error::InvalidState(_)) => {
            let text = svc.locales().resolve(lang, "ticket_limit_reached", &[]);
            let _ = state
                .messenger
                .send_reply_menu(chat, &text, main_menu(svc.locales(), lang))
                .await;
        }
        Err(err) => {
            tracing::error!(user_id = user_id.0, "ticket creation failed: {err}");
            let text = svc.locales().resolve(lang, "generic_error", &[]);
            let _ = state.messenger.send_text(chat, &text, None).await;
        }
    }
}

fn inbound_from(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: msg
            .from()
            .map(|u| UserId(u.id.0 as i64))
            .unwrap_or(UserId(0)),
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        thread_id: msg.thread_id.map(ThreadId),
        reply_to: msg.reply_to_message().map(|quoted| ReplyTarget {
            message: MessageRef {
                chat_id: ChatId(quoted.chat.id.0),
                message_id: MessageId(quoted.id.0),
            },
            text: quoted
                .text()
                .or_else(|| quoted.caption())
                .map(str::to_string),
        }),
        has_attachment: extract_attachment(msg).is_some(),
        from_bot: msg.from().map(|u| u.is_bot).unwrap_or(false),
    }
}

fn extract_attachment(msg: &Message) -> Option<Attachment> {
    if let Some(sizes) = msg.photo() {
        let best = sizes.last()?;
        return Some(attachment(AttachmentKind::Photo, &best.file.id));
    }
    // GIFs arrive with both animation and document set; animation wins.
    if let Some(animation) = msg.animation() {
        return Some(attachment(AttachmentKind::Animation, &animation.file.id));
    }
    if let Some(video) = msg.video() {
        return Some(attachment(AttachmentKind::Video, &video.file.id));
    }
    if let Some(document) = msg.document() {
        return Some(attachment(AttachmentKind::Document, &document.file.id));
    }
    None
}

fn attachment(kind: AttachmentKind, file_id: &str) -> Attachment {
    Attachment {
        kind,
        external_ref: file_id.to_string(),
        local_ref: None,
    }
}
