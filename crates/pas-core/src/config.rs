use std::{borrow::Cow, env, path::PathBuf, sync::OnceLock, time::Duration};

use regex::Regex;

use crate::{
    domain::{Account, LoginFailure},
    errors::Error,
    Result,
};

/// Highest `PTT_ID_<n>` slot that is read.
pub const MAX_ACCOUNT_SLOTS: usize = 5;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Typed, validated configuration.
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub notification: NotificationConfig,
    pub login: LoginConfig,
    pub log: LogConfig,
    pub accounts: Vec<Account>,
    pub notify_policy: NotifyPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationConfig {
    pub token: String,
    /// Numeric chat id or `@channel` name.
    pub chat_id: String,
    /// Deliver messages silently (Telegram `disable_notification`).
    pub disable_notification: bool,
    pub retry_count: u32,
    pub timeout: Duration,
    /// Base of the exponential backoff between delivery retries.
    pub retry_delay: Duration,
    pub api_base: String,
}

impl NotificationConfig {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            disable_notification: false,
            retry_count: 3,
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(2),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::Config("Telegram bot token is required".to_string()));
        }
        if !token_pattern().is_match(&self.token) {
            return Err(Error::Config(
                "Invalid Telegram bot token format".to_string(),
            ));
        }
        if self.chat_id.trim().is_empty() {
            return Err(Error::Config("Telegram chat ID is required".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("Telegram timeout must be positive".to_string()));
        }
        if self.retry_delay.is_zero() {
            return Err(Error::Config(
                "Telegram retry delay must be positive".to_string(),
            ));
        }
        if self.api_base.trim().is_empty() {
            return Err(Error::Config("Telegram API base URL is empty".to_string()));
        }
        Ok(())
    }
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^\d+:[A-Za-z0-9_-]+$").expect("token regex"))
}

/// Human-readable text for each recognised login failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureMessages {
    pub no_such_user: String,
    pub wrong_id_or_password: String,
    pub wrong_password: String,
    pub login_too_often: String,
    pub use_too_many_resources: String,
    pub unregistered_user: String,
}

impl Default for FailureMessages {
    fn default() -> Self {
        Self {
            no_such_user: "PTT 登入失敗！\n找不到使用者".to_string(),
            wrong_id_or_password: "PTT 登入失敗！\n帳號或密碼錯誤".to_string(),
            wrong_password: "PTT 登入失敗！\n密碼錯誤".to_string(),
            login_too_often: "PTT 登入失敗！\n登入次數過於頻繁".to_string(),
            use_too_many_resources: "PTT 登入失敗！\n系統資源使用過多".to_string(),
            unregistered_user: "未註冊的使用者".to_string(),
        }
    }
}

impl FailureMessages {
    /// Message for a failure. Unrecognised failures keep their own text.
    pub fn message_for<'a>(&'a self, failure: &'a LoginFailure) -> Cow<'a, str> {
        match failure {
            LoginFailure::NoSuchUser => Cow::Borrowed(&self.no_such_user),
            LoginFailure::WrongIdOrPassword => Cow::Borrowed(&self.wrong_id_or_password),
            LoginFailure::WrongPassword => Cow::Borrowed(&self.wrong_password),
            LoginFailure::LoginTooOften => Cow::Borrowed(&self.login_too_often),
            LoginFailure::UseTooManyResources => Cow::Borrowed(&self.use_too_many_resources),
            LoginFailure::UnregisteredUser => Cow::Borrowed(&self.unregistered_user),
            LoginFailure::Other(text) => Cow::Owned(text.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginConfig {
    pub timezone_hours: i32,
    pub messages: FailureMessages,
    pub max_retries: u32,
    /// Backoff base for transient login failures: `retry_delay * 2^(n-1)` before retry `n`.
    pub retry_delay: Duration,
    pub connection_timeout: Duration,
    pub kick_other_session: bool,
    pub host: String,
    pub port: u16,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            timezone_hours: 8,
            messages: FailureMessages::default(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            connection_timeout: Duration::from_secs(30),
            kick_other_session: true,
            host: "ptt.cc".to_string(),
            port: 23,
        }
    }
}

impl LoginConfig {
    pub fn validate(&self) -> Result<()> {
        if !(-12..=14).contains(&self.timezone_hours) {
            return Err(Error::Config(
                "Timezone hours must be between -12 and 14".to_string(),
            ));
        }
        if self.retry_delay.is_zero() {
            return Err(Error::Config("Retry delay must be positive".to_string()));
        }
        if self.connection_timeout.is_zero() {
            return Err(Error::Config(
                "Connection timeout must be positive".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config("PTT host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("PTT port must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// `tracing` level name (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    pub debug_mode: bool,
    pub json: bool,
    pub include_hostname: bool,
    /// When set, logs are also written to daily-rotated files in this directory.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug_mode: false,
            json: false,
            include_hostname: true,
            dir: None,
        }
    }
}

impl LogConfig {
    pub fn effective_level(&self) -> &str {
        if self.debug_mode {
            "debug"
        } else {
            &self.level
        }
    }
}

/// Where login outcomes are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// One message per account as soon as its outcome is known.
    #[default]
    PerAccount,
    /// A single aggregate message after the whole batch.
    Summary,
}

impl NotifyPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyPolicy::PerAccount => "per_account",
            NotifyPolicy::Summary => "summary",
        }
    }
}

impl Config {
    /// Load from the process environment (and `.env` if present).
    pub fn load() -> Result<Self> {
        // Existing variables win over `.env` entries.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Used directly by tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let token = env.str("TELEGRAM_BOT_TOKEN").and_then(non_empty);
        let chat_id = env.str("TELEGRAM_CHAT_ID").and_then(non_empty);
        let (Some(token), Some(chat_id)) = (token, chat_id) else {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID environment variables are required"
                    .to_string(),
            ));
        };

        let notification = NotificationConfig {
            token,
            chat_id: chat_id.trim().to_string(),
            disable_notification: env.bool("DISABLE_NOTIFICATIONS")?.unwrap_or(false),
            retry_count: env.u32("TELEGRAM_RETRY_COUNT")?.unwrap_or(3),
            timeout: env.secs("TELEGRAM_TIMEOUT")?.unwrap_or(Duration::from_secs(10)),
            retry_delay: env
                .secs("TELEGRAM_RETRY_DELAY")?
                .unwrap_or(Duration::from_secs(2)),
            api_base: env
                .str("TELEGRAM_API_BASE")
                .and_then(non_empty)
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        };
        notification.validate()?;

        let defaults = LoginConfig::default();
        let timezone_hours = match env.i32("PTT_TIMEZONE_HOURS")? {
            Some(h) => h,
            None => env.i32("TIMEZONE_HOURS")?.unwrap_or(defaults.timezone_hours),
        };
        let login = LoginConfig {
            timezone_hours,
            messages: FailureMessages::default(),
            max_retries: env.u32("PTT_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay: env.secs("PTT_RETRY_DELAY")?.unwrap_or(defaults.retry_delay),
            connection_timeout: env
                .secs("PTT_CONNECTION_TIMEOUT")?
                .unwrap_or(defaults.connection_timeout),
            kick_other_session: env
                .bool("PTT_KICK_OTHER_SESSION")?
                .unwrap_or(defaults.kick_other_session),
            host: env
                .str("PTT_HOST")
                .and_then(non_empty)
                .unwrap_or(defaults.host),
            port: env.u16("PTT_PORT")?.unwrap_or(defaults.port),
        };
        login.validate()?;

        let log = LogConfig {
            level: env
                .str("LOG_LEVEL")
                .and_then(non_empty)
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_else(|| "info".to_string()),
            debug_mode: env.bool("DEBUG_MODE")?.unwrap_or(false),
            json: env.bool("LOG_JSON_FORMAT")?.unwrap_or(false),
            include_hostname: env.bool("LOG_INCLUDE_HOSTNAME")?.unwrap_or(true),
            dir: env.str("LOG_DIR").and_then(non_empty).map(PathBuf::from),
        };

        let notify_policy = match env.str("NOTIFY_MODE").and_then(non_empty) {
            None => NotifyPolicy::default(),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "per_account" | "per-account" | "account" => NotifyPolicy::PerAccount,
                "summary" => NotifyPolicy::Summary,
                other => {
                    return Err(Error::Config(format!(
                        "NOTIFY_MODE must be per_account or summary, got {other}"
                    )))
                }
            },
        };

        let accounts = parse_accounts(&env)?;

        Ok(Self {
            notification,
            login,
            log,
            accounts,
            notify_policy,
        })
    }

    /// JSON view of the configuration with secrets masked.
    pub fn redacted_json(&self) -> Result<String> {
        let n = &self.notification;
        let l = &self.login;
        let v = serde_json::json!({
            "telegram": {
                "token": mask_token(&n.token),
                "chat_id": n.chat_id,
                "disable_notification": n.disable_notification,
                "retry_count": n.retry_count,
                "timeout_secs": n.timeout.as_secs(),
                "retry_delay_secs": n.retry_delay.as_secs(),
                "api_base": n.api_base,
            },
            "ptt": {
                "timezone_hours": l.timezone_hours,
                "max_retries": l.max_retries,
                "retry_delay_secs": l.retry_delay.as_secs(),
                "connection_timeout_secs": l.connection_timeout.as_secs(),
                "kick_other_session": l.kick_other_session,
                "host": l.host,
                "port": l.port,
            },
            "log": {
                "level": self.log.effective_level(),
                "json": self.log.json,
                "include_hostname": self.log.include_hostname,
                "dir": self.log.dir.as_ref().map(|p| p.display().to_string()),
            },
            "notify_mode": self.notify_policy.as_str(),
            "accounts": self.accounts.iter().map(|a| a.username.as_str()).collect::<Vec<_>>(),
        });
        Ok(serde_json::to_string_pretty(&v)?)
    }
}

fn parse_accounts<F>(env: &Env<F>) -> Result<Vec<Account>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut accounts = Vec::new();

    // A blank slot 1 counts as unset.
    match env.str("PTT_ID_1").and_then(non_empty) {
        Some(raw) => {
            if let Some(account) = parse_account_slot(1, &raw)? {
                accounts.push(account);
            }
        }
        None => {
            let user = env.str("PTT_USERNAME").and_then(non_empty);
            let pass = env.str("PTT_PASSWORD").and_then(non_empty);
            let (Some(user), Some(pass)) = (user, pass) else {
                return Err(Error::Config(
                    "Main PTT account not set (PTT_ID_1 or PTT_USERNAME/PTT_PASSWORD)".to_string(),
                ));
            };
            accounts.push(Account::new(user.trim(), pass));
        }
    }

    for slot in 2..=MAX_ACCOUNT_SLOTS {
        let Some(raw) = env.str(&format!("PTT_ID_{slot}")) else {
            continue;
        };
        if raw.trim().is_empty() {
            continue;
        }
        if let Some(account) = parse_account_slot(slot, &raw)? {
            accounts.push(account);
        }
    }

    if accounts.is_empty() {
        return Err(Error::Config(
            "No valid PTT accounts found in environment variables".to_string(),
        ));
    }
    Ok(accounts)
}

/// Parse one `username,password` slot. Sentinel values yield `None`.
pub fn parse_account_slot(slot: usize, raw: &str) -> Result<Option<Account>> {
    let value = raw.trim();
    if matches!(value.to_lowercase().as_str(), "none" | "none,none") {
        return Ok(None);
    }

    let parts: Vec<&str> = value.split(',').collect();
    let [username, password] = parts.as_slice() else {
        return Err(Error::Config(format!(
            "Invalid account format for PTT_ID_{slot}: expected username,password"
        )));
    };
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(Error::Config(format!(
            "Username and password cannot be empty for PTT_ID_{slot}"
        )));
    }
    Ok(Some(Account::new(username, *password)))
}

fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((bot_id, _)) => format!("{bot_id}:***"),
        None => "***".to_string(),
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Upper-case name first, then the lower-case spelling older deployments use.
    fn str(&self, key: &str) -> Option<String> {
        (self.lookup)(key).or_else(|| (self.lookup)(&key.to_lowercase()))
    }

    fn bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.str(key) else {
            return Ok(None);
        };
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
            other => Err(Error::Config(format!("{key} must be a boolean, got {other}"))),
        }
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, what: &str) -> Result<Option<T>> {
        let Some(raw) = self.str(key).and_then(non_empty) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} must be {what}, got {}", raw.trim())))
    }

    fn u32(&self, key: &str) -> Result<Option<u32>> {
        self.parse(key, "a non-negative integer")
    }

    fn u16(&self, key: &str) -> Result<Option<u16>> {
        self.parse(key, "a port number")
    }

    fn i32(&self, key: &str) -> Result<Option<i32>> {
        self.parse(key, "an integer")
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self
            .parse::<u64>(key, "a number of seconds")?
            .map(Duration::from_secs))
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TOKEN: &str = "123456:ABC-def_ghi";

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("TELEGRAM_CHAT_ID", "42"),
            ("PTT_ID_1", "alice,p1"),
        ]
    }

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut v = base();
        for (k, val) in extra {
            v.retain(|(key, _)| key != k);
            v.push((*k, *val));
        }
        v
    }

    #[test]
    fn loads_defaults() {
        let cfg = load(&base()).unwrap();
        assert_eq!(cfg.notification.token, TOKEN);
        assert_eq!(cfg.notification.chat_id, "42");
        assert_eq!(cfg.notification.retry_count, 3);
        assert_eq!(cfg.notification.timeout, Duration::from_secs(10));
        assert_eq!(cfg.notification.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.login, LoginConfig::default());
        assert_eq!(cfg.log, LogConfig::default());
        assert_eq!(cfg.notify_policy, NotifyPolicy::PerAccount);
        assert_eq!(cfg.accounts, vec![Account::new("alice", "p1")]);
    }

    #[test]
    fn missing_token_or_chat_id_fails() {
        let err = load(&[("TELEGRAM_CHAT_ID", "42"), ("PTT_ID_1", "a,b")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("PTT_ID_1", "a,b")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_malformed_token() {
        let err = load(&with(&[("TELEGRAM_BOT_TOKEN", "not-a-token")])).unwrap_err();
        assert!(err.to_string().contains("token format"));
    }

    #[test]
    fn rejects_zero_timeout_and_bad_numbers() {
        assert!(load(&with(&[("TELEGRAM_TIMEOUT", "0")])).is_err());
        assert!(load(&with(&[("TELEGRAM_RETRY_COUNT", "-1")])).is_err());
        assert!(load(&with(&[("PTT_MAX_RETRIES", "three")])).is_err());
        assert!(load(&with(&[("PTT_RETRY_DELAY", "0")])).is_err());
        assert!(load(&with(&[("PTT_CONNECTION_TIMEOUT", "0")])).is_err());
    }

    #[test]
    fn timezone_range_is_enforced() {
        assert!(load(&with(&[("PTT_TIMEZONE_HOURS", "15")])).is_err());
        assert!(load(&with(&[("PTT_TIMEZONE_HOURS", "-13")])).is_err());
        let cfg = load(&with(&[("PTT_TIMEZONE_HOURS", "-12")])).unwrap();
        assert_eq!(cfg.login.timezone_hours, -12);
        let cfg = load(&with(&[("TIMEZONE_HOURS", "14")])).unwrap();
        assert_eq!(cfg.login.timezone_hours, 14);
    }

    #[test]
    fn lower_case_names_are_accepted() {
        let cfg = load(&[
            ("telegram_bot_token", TOKEN),
            ("telegram_chat_id", "@channel"),
            ("ptt_id_1", "bob,pw"),
            ("ptt_kick_other_session", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.notification.chat_id, "@channel");
        assert!(!cfg.login.kick_other_session);
        assert_eq!(cfg.accounts[0].username, "bob");
    }

    #[test]
    fn sentinel_slots_are_skipped() {
        let cfg = load(&with(&[
            ("PTT_ID_1", "none"),
            ("PTT_ID_2", "bob,p2"),
            ("PTT_ID_3", "None,None"),
            ("PTT_ID_5", "carol,p5"),
        ]))
        .unwrap();
        let names: Vec<&str> = cfg.accounts.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);
    }

    #[test]
    fn only_sentinels_fails() {
        let err = load(&with(&[("PTT_ID_1", "none,none"), ("PTT_ID_2", "NONE")])).unwrap_err();
        assert!(err.to_string().contains("No valid PTT accounts"));
    }

    #[test]
    fn malformed_pairs_fail() {
        assert!(load(&with(&[("PTT_ID_1", "alice")])).is_err());
        assert!(load(&with(&[("PTT_ID_1", "alice,p,extra")])).is_err());
        assert!(load(&with(&[("PTT_ID_1", ",p1")])).is_err());
        assert!(load(&with(&[("PTT_ID_2", "bob,")])).is_err());
    }

    #[test]
    fn falls_back_to_username_password_pair() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("TELEGRAM_CHAT_ID", "42"),
            ("PTT_USERNAME", "dave"),
            ("PTT_PASSWORD", "pw"),
        ])
        .unwrap();
        assert_eq!(cfg.accounts, vec![Account::new("dave", "pw")]);

        let err = load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("TELEGRAM_CHAT_ID", "42")]).unwrap_err();
        assert!(err.to_string().contains("Main PTT account"));
    }

    #[test]
    fn blank_first_slot_falls_back_to_username_pair() {
        let cfg = load(&with(&[
            ("PTT_ID_1", ""),
            ("PTT_ID_2", "bob,pw2"),
            ("PTT_USERNAME", "dave"),
            ("PTT_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.accounts,
            vec![Account::new("dave", "pw"), Account::new("bob", "pw2")]
        );

        let err = load(&with(&[("PTT_ID_1", "  "), ("PTT_ID_2", "bob,pw2")])).unwrap_err();
        assert!(err.to_string().contains("Main PTT account"));
    }

    #[test]
    fn notify_mode_and_logging() {
        let cfg = load(&with(&[
            ("NOTIFY_MODE", "summary"),
            ("DEBUG_MODE", "true"),
            ("LOG_JSON_FORMAT", "yes"),
            ("LOG_DIR", "/tmp/pas-logs"),
        ]))
        .unwrap();
        assert_eq!(cfg.notify_policy, NotifyPolicy::Summary);
        assert_eq!(cfg.log.effective_level(), "debug");
        assert!(cfg.log.json);
        assert_eq!(cfg.log.dir, Some(PathBuf::from("/tmp/pas-logs")));
        assert!(load(&with(&[("NOTIFY_MODE", "sometimes")])).is_err());
        assert!(load(&with(&[("DEBUG_MODE", "maybe")])).is_err());
    }

    #[test]
    fn failure_messages_cover_every_condition() {
        let m = FailureMessages::default();
        assert_eq!(
            m.message_for(&LoginFailure::WrongPassword),
            "PTT 登入失敗！\n密碼錯誤"
        );
        assert_eq!(
            m.message_for(&LoginFailure::LoginTooOften),
            "PTT 登入失敗！\n登入次數過於頻繁"
        );
        assert_eq!(
            m.message_for(&LoginFailure::UnregisteredUser),
            "未註冊的使用者"
        );
        assert_eq!(m.message_for(&LoginFailure::Other("eof".into())), "eof");
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let cfg = load(&base()).unwrap();
        let json = cfg.redacted_json().unwrap();
        assert!(json.contains("123456:***"));
        assert!(!json.contains("ABC-def_ghi"));
        assert!(!json.contains("p1"));
        assert!(json.contains("alice"));
    }
}
