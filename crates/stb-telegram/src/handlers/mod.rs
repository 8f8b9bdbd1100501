//! Telegram update handlers.
//!
//! `message` carries the whole routing pipeline (tracking, ban gate,
//! cooldowns, menu interception, classification, dispatch); `commands`
//! implements /start, /lang, the admin panel and the reply-menu buttons;
//! `callback` dispatches inline-button taps by data prefix.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use stb_core::{locales::LocaleStore, messaging::types::ReplyMenu};

use crate::router::AppState;

mod callback;
mod commands;
mod message;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    message::handle_message(msg, state).await
}

/// "First Last (@username)", degrading gracefully when parts are missing.
pub(crate) fn display_name(user: &teloxide::types::User) -> String {
    let mut name = user.first_name.clone();
    if let Some(last) = &user.last_name {
        name.push(' ');
        name.push_str(last);
    }
    match &user.username {
        Some(tag) => format!("{name} (@{tag})"),
        None => name,
    }
}

pub(crate) fn main_menu(locales: &LocaleStore, lang: Option<&str>) -> ReplyMenu {
    ReplyMenu::new(vec![
        vec![locales.resolve(lang, "button_create_ticket", &[])],
        vec![
            locales.resolve(lang, "button_my_tickets", &[]),
            locales.resolve(lang, "button_write_to_ticket", &[]),
        ],
    ])
}

pub(crate) fn cancel_menu(locales: &LocaleStore, lang: Option<&str>) -> ReplyMenu {
    ReplyMenu::new(vec![vec![locales.resolve(lang, "button_cancel", &[])]])
}

pub(crate) fn format_ts(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tg_user(first: &str, last: Option<&str>, username: Option<&str>) -> teloxide::types::User {
        teloxide::types::User {
            id: teloxide::types::UserId(5),
            is_bot: false,
            first_name: first.to_string(),
            last_name: last.map(str::to_string),
            username: username.map(str::to_string),
            language_code: None,
            is_premium: false,
            added_to_attachment_menu: false,
        }
    }

    #[test]
    fn display_name_combines_available_parts() {
        assert_eq!(display_name(&tg_user("Alice", None, None)), "Alice");
        assert_eq!(display_name(&tg_user("Alice", Some("B"), None)), "Alice B");
        assert_eq!(
            display_name(&tg_user("Alice", Some("B"), Some("alice_b"))),
            "Alice B (@alice_b)"
        );
    }

    #[test]
    fn timestamp_formatting_handles_out_of_range() {
        assert_eq!(format_ts(0), "1970-01-01 00:00");
        assert_eq!(format_ts(i64::MAX), "-");
    }
}
