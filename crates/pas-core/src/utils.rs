use std::{env, fs};

/// Cut `s` to `max_chars` characters, appending `...` when shortened.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

/// Best-effort host name for log lines and error notifications.
pub fn hostname() -> String {
    if let Some(h) = env::var("HOSTNAME").ok().filter(|h| !h.trim().is_empty()) {
        return h.trim().to_string();
    }
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Flatten an error and its `source()` chain into one line per cause.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    let mut cur = err.source();
    while let Some(cause) = cur {
        lines.push(format!("caused by: {cause}"));
        cur = cause.source();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("登入成功", 10), "登入成功");
        assert_eq!(truncate_text("登入成功", 2), "登入...");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
    }

    #[test]
    fn hostname_is_never_empty() {
        assert!(!hostname().is_empty());
    }

    #[test]
    fn chain_lists_sources() {
        let err = crate::Error::Login(crate::domain::LoginFailure::Other("eof".into()));
        let lines = error_chain(&err);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("caused by: eof"));
    }
}
