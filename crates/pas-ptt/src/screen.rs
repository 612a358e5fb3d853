//! Screen scraping: ANSI stripping, Big5 decoding and prompt detection.

use std::sync::OnceLock;

use encoding_rs::BIG5;
use pas_core::domain::{LoginFailure, UserInfo};
use regex::Regex;

/// Screens the client knows how to react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    WrongPassword,
    NoSuchUser,
    LoginTooOften,
    TooManyResources,
    Unregistered,
    DuplicateSession,
    DeleteFailedLog,
    UnfinishedPost,
    UserQuery,
    MainMenu,
    Goodbye,
    PressAnyKey,
    AskPassword,
    AskUsername,
}

/// Detection order matters: error banners win over the prompts drawn below them.
const PATTERNS: &[(Prompt, &[&str])] = &[
    (Prompt::WrongPassword, &["密碼不對", "密碼錯誤"]),
    (Prompt::NoSuchUser, &["查無此人", "無此使用者"]),
    (Prompt::LoginTooOften, &["登入太頻繁"]),
    (Prompt::TooManyResources, &["程式耗用過多計算資源", "系統過載"]),
    (Prompt::Unregistered, &["尚未完成註冊", "註冊申請單尚在處理中"]),
    (Prompt::DuplicateSession, &["刪除其他重複登入的連線"]),
    (Prompt::DeleteFailedLog, &["刪除以上錯誤嘗試"]),
    (Prompt::UnfinishedPost, &["文章尚未完成"]),
    (Prompt::UserQuery, &["《ＩＤ暱稱》"]),
    (Prompt::MainMenu, &["主功能表"]),
    (Prompt::Goodbye, &["您確定要離開"]),
    (Prompt::PressAnyKey, &["任意鍵"]),
    (Prompt::AskPassword, &["請輸入您的密碼"]),
    (Prompt::AskUsername, &["請輸入代號"]),
];

impl Prompt {
    pub const ALL: &'static [Prompt] = &[
        Prompt::WrongPassword,
        Prompt::NoSuchUser,
        Prompt::LoginTooOften,
        Prompt::TooManyResources,
        Prompt::Unregistered,
        Prompt::DuplicateSession,
        Prompt::DeleteFailedLog,
        Prompt::UnfinishedPost,
        Prompt::UserQuery,
        Prompt::MainMenu,
        Prompt::Goodbye,
        Prompt::PressAnyKey,
        Prompt::AskPassword,
        Prompt::AskUsername,
    ];

    /// The login failure this screen stands for, if it is an error screen.
    pub fn failure(self) -> Option<LoginFailure> {
        match self {
            Prompt::WrongPassword => Some(LoginFailure::WrongIdOrPassword),
            Prompt::NoSuchUser => Some(LoginFailure::NoSuchUser),
            Prompt::LoginTooOften => Some(LoginFailure::LoginTooOften),
            Prompt::TooManyResources => Some(LoginFailure::UseTooManyResources),
            Prompt::Unregistered => Some(LoginFailure::UnregisteredUser),
            _ => None,
        }
    }
}

/// First prompt of `wanted` found in `text`, in detection order.
pub fn detect(text: &str, wanted: &[Prompt]) -> Option<Prompt> {
    PATTERNS
        .iter()
        .filter(|(p, _)| wanted.contains(p))
        .find(|(_, needles)| needles.iter().any(|n| text.contains(n)))
        .map(|(p, _)| *p)
}

/// Decode Big5 terminal output and drop ANSI control sequences.
///
/// Cursor-positioning sequences become newlines so fields drawn on separate
/// rows do not run together.
pub fn render(raw: &[u8]) -> String {
    let (decoded, _, _) = BIG5.decode(raw);
    strip_ansi(&decoded)
}

pub fn strip_ansi(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let re = ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*([A-Za-z])|\x1b[()][0-9A-Za-z]|\x1b[=>78DEM]")
            .expect("ansi regex")
    });
    let stripped = re.replace_all(text, |caps: &regex::Captures<'_>| {
        match caps.get(1).map(|m| m.as_str()) {
            Some("H") | Some("f") => "\n",
            _ => "",
        }
    });
    stripped
        .chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect()
}

/// Encode outgoing keystrokes for the BBS.
pub fn encode(text: &str) -> Vec<u8> {
    let (bytes, _, _) = BIG5.encode(text);
    bytes.into_owned()
}

/// Extract login count and mailbox status from a user query screen.
pub fn parse_user_info(text: &str) -> Option<UserInfo> {
    static LOGIN_COUNT: OnceLock<Regex> = OnceLock::new();
    static MAIL: OnceLock<Regex> = OnceLock::new();

    let login_count = LOGIN_COUNT
        .get_or_init(|| Regex::new(r"《登入次數》\s*(\d+)").expect("login count regex"))
        .captures(text)?
        .get(1)?
        .as_str()
        .parse::<u32>()
        .ok()?;

    let mail = MAIL
        .get_or_init(|| Regex::new(r"《私人信箱》\s*([^《\n]*)").expect("mail regex"))
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(UserInfo { login_count, mail })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_SCREEN: &str = "\x1b[1;1H\x1b[0;1;37;44m《ＩＤ暱稱》alice (Alice)\x1b[m    《經濟狀況》小康\
\x1b[3;1H《登入次數》1234 次 (同天內只計一次)   《 有效文章 》 56 篇\
\x1b[4;1H《目前動態》不在站上            《私人信箱》最近無新信件\
\x1b[23;1H\x1b[1;34;44m 請按任意鍵繼續 \x1b[m";

    #[test]
    fn strips_colour_and_keeps_rows_apart() {
        let s = strip_ansi("\x1b[1;33mhello\x1b[m\x1b[2;1Hworld\r");
        assert_eq!(s, "hello\nworld");
    }

    #[test]
    fn big5_round_trip() {
        let bytes = encode("請輸入代號");
        assert_ne!(bytes, "請輸入代號".as_bytes());
        assert_eq!(render(&bytes), "請輸入代號");
    }

    #[test]
    fn error_banner_wins_over_prompt() {
        let text = "密碼不對或無此帳號。請檢查大小寫及有無輸入錯誤。\n請輸入代號，或以 guest 參觀";
        assert_eq!(detect(text, Prompt::ALL), Some(Prompt::WrongPassword));
    }

    #[test]
    fn frequent_login_advisory_is_just_a_pause() {
        let text = "請勿頻繁登入以免造成系統過度負荷\n請按任意鍵繼續";
        assert_eq!(detect(text, Prompt::ALL), Some(Prompt::PressAnyKey));
    }

    #[test]
    fn detect_respects_wanted_set() {
        let text = strip_ansi(QUERY_SCREEN);
        assert_eq!(detect(&text, Prompt::ALL), Some(Prompt::UserQuery));
        assert_eq!(
            detect(&text, &[Prompt::PressAnyKey]),
            Some(Prompt::PressAnyKey)
        );
        assert_eq!(detect(&text, &[Prompt::MainMenu]), None);
    }

    #[test]
    fn parses_user_query_screen() {
        let text = strip_ansi(QUERY_SCREEN);
        let info = parse_user_info(&text).unwrap();
        assert_eq!(info.login_count, 1234);
        assert_eq!(info.mail, "最近無新信件");
    }

    #[test]
    fn missing_login_count_is_none() {
        assert_eq!(parse_user_info("《私人信箱》有新信"), None);
    }

    #[test]
    fn error_screens_map_to_failures() {
        assert_eq!(
            Prompt::LoginTooOften.failure(),
            Some(LoginFailure::LoginTooOften)
        );
        assert_eq!(
            Prompt::WrongPassword.failure(),
            Some(LoginFailure::WrongIdOrPassword)
        );
        assert_eq!(Prompt::MainMenu.failure(), None);
    }
}
