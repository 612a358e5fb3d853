//! Notification text (Telegram HTML parse mode).

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::{
    config::FailureMessages,
    domain::{LoginFailure, RunSummary, UserInfo},
    utils::error_chain,
};

/// Lines of error trace kept in an error notification.
pub const TRACE_MAX_LINES: usize = 12;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Current time at a fixed UTC offset given in hours.
pub fn local_now(timezone_hours: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(timezone_hours * 3600).unwrap_or(Utc.fix());
    Utc::now().with_timezone(&offset)
}

pub fn format_success(username: &str, info: &UserInfo, now: DateTime<FixedOffset>) -> String {
    format!(
        "✅ PTT {} signed in successfully\n📆 Login streak: {} days\n📫 {}\n#ptt #{}",
        escape_html(username),
        info.login_count,
        escape_html(&info.mail),
        now.format("%Y%m%d")
    )
}

/// Failure text for a recognised condition. An unregistered account gets its
/// id in front of the message, since the message alone does not name it.
pub fn format_failure(username: &str, failure: &LoginFailure, messages: &FailureMessages) -> String {
    let message = escape_html(&messages.message_for(failure));
    match failure {
        LoginFailure::UnregisteredUser => format!("❌ {} {message}", escape_html(username)),
        _ => format!("❌ {message}"),
    }
}

pub fn format_unexpected(username: &str, error_text: &str) -> String {
    format!(
        "❌ Unexpected error for {}: {}",
        escape_html(username),
        escape_html(error_text)
    )
}

/// Aggregate message used when notifications are batched per run.
pub fn format_summary(summary: &RunSummary, now: DateTime<FixedOffset>) -> String {
    let mut out = format!(
        "📋 PTT sign-in: {}/{} succeeded\n",
        summary.success_count(),
        summary.len()
    );
    for (username, ok) in summary.iter() {
        let mark = if ok { "✅" } else { "❌" };
        out.push_str(&format!("{mark} {}\n", escape_html(username)));
    }
    out.push_str(&format!("#ptt #{}", now.format("%Y%m%d")));
    out
}

/// Inputs of a structured error notification.
pub struct ErrorReport<'a> {
    pub kind: &'a str,
    pub error: &'a (dyn std::error::Error + 'static),
    pub context: &'a [(&'a str, &'a str)],
    pub hostname: &'a str,
    pub now: DateTime<FixedOffset>,
}

pub fn format_error_notification(report: &ErrorReport<'_>) -> String {
    let mut msg = String::from("❌ <b>Error Notification</b>\n\n");
    msg.push_str(&format!(
        "<b>Time:</b> {}\n",
        report.now.format("%Y-%m-%d %H:%M:%S")
    ));
    msg.push_str(&format!("<b>Host:</b> {}\n", escape_html(report.hostname)));
    msg.push_str(&format!("<b>Error Type:</b> {}\n", escape_html(report.kind)));
    msg.push_str(&format!(
        "<b>Error Message:</b> {}\n",
        escape_html(&report.error.to_string())
    ));

    if !report.context.is_empty() {
        msg.push_str("\n<b>Context:</b>\n");
        for (key, value) in report.context {
            msg.push_str(&format!(
                "• <b>{}:</b> {}\n",
                escape_html(key),
                escape_html(value)
            ));
        }
    }

    let mut trace = error_chain(report.error);
    if trace.len() > TRACE_MAX_LINES {
        trace.truncate(TRACE_MAX_LINES);
        trace.push("...".to_string());
    }
    msg.push_str("\n<b>Trace:</b>\n<pre>");
    msg.push_str(&escape_html(&trace.join("\n")));
    msg.push_str("</pre>");

    msg.push_str(&format!(
        "\n<b>System:</b> {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    msg
}
