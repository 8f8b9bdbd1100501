use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    /// The support group (forum-enabled supergroup) all tickets live in.
    pub support_group_id: i64,
    pub admin_ids: Vec<i64>,
    /// Main admins can ban/unban and see the full admin panel.
    pub main_admin_ids: Vec<i64>,

    // Storage
    pub tickets_path: PathBuf,
    pub users_path: PathBuf,
    pub log_path: PathBuf,
    pub media_dir: PathBuf,
    pub locales_dir: PathBuf,

    // Behavior
    pub max_open_tickets: u32,
    pub default_lang: String,

    // Cooldowns
    pub message_cooldown: Duration,
    pub callback_cooldown: Duration,
    pub ticket_create_cooldown: Duration,

    // Confirmation staging
    pub confirm_ttl: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("SUPPORT_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "SUPPORT_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let support_group_id = env_i64("SUPPORT_GROUP_ID").ok_or_else(|| {
            Error::Config("SUPPORT_GROUP_ID environment variable is required".to_string())
        })?;

        let admin_ids = parse_csv_i64(env_str("SUPPORT_ADMIN_IDS"));
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "SUPPORT_ADMIN_IDS environment variable is required".to_string(),
            ));
        }
        // Main admins default to the full admin list.
        let mut main_admin_ids = parse_csv_i64(env_str("SUPPORT_MAIN_ADMIN_IDS"));
        if main_admin_ids.is_empty() {
            main_admin_ids = admin_ids.clone();
        }

        let data_dir = env_path("SUPPORT_DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));
        let tickets_path =
            env_path("SUPPORT_TICKETS_PATH").unwrap_or_else(|| data_dir.join("tickets.json"));
        let users_path =
            env_path("SUPPORT_USERS_PATH").unwrap_or_else(|| data_dir.join("users.json"));
        let log_path =
            env_path("SUPPORT_LOG_PATH").unwrap_or_else(|| data_dir.join("events.log"));
        let media_dir = env_path("SUPPORT_MEDIA_DIR").unwrap_or_else(|| data_dir.join("media"));
        let locales_dir =
            env_path("SUPPORT_LOCALES_DIR").unwrap_or_else(|| data_dir.join("locales"));

        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&media_dir)?;

        let max_open_tickets = env_u32("SUPPORT_MAX_OPEN_TICKETS").unwrap_or(3);
        let default_lang = env_str("SUPPORT_DEFAULT_LANG").unwrap_or_else(|| "en".to_string());

        let message_cooldown =
            Duration::from_millis(env_u64("SUPPORT_MESSAGE_COOLDOWN_MS").unwrap_or(2000));
        let callback_cooldown =
            Duration::from_millis(env_u64("SUPPORT_CALLBACK_COOLDOWN_MS").unwrap_or(2000));
        let ticket_create_cooldown =
            Duration::from_millis(env_u64("SUPPORT_TICKET_CREATE_COOLDOWN_MS").unwrap_or(10_000));

        let confirm_ttl = Duration::from_secs(env_u64("SUPPORT_CONFIRM_TTL_SECS").unwrap_or(1800));

        Ok(Self {
            bot_token,
            support_group_id,
            admin_ids,
            main_admin_ids,
            tickets_path,
            users_path,
            log_path,
            media_dir,
            locales_dir,
            max_open_tickets,
            default_lang,
            message_cooldown,
            callback_cooldown,
            ticket_create_cooldown,
            confirm_ttl,
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id) || self.main_admin_ids.contains(&user_id)
    }

    pub fn is_main_admin(&self, user_id: i64) -> bool {
        self.main_admin_ids.contains(&user_id)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}
