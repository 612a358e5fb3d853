use async_trait::async_trait;

use crate::{
    domain::{LoginFailure, UserInfo},
    Error,
};

/// Hexagonal port for the BBS terminal client.
///
/// One instance holds at most one session. The orchestrator drives it strictly
/// sequentially: `login`, then `get_user`, then `logout`.
#[async_trait]
pub trait BbsClient: Send + Sync {
    async fn login(
        &mut self,
        username: &str,
        password: &str,
        kick_other_session: bool,
    ) -> std::result::Result<(), LoginFailure>;

    async fn get_user(&mut self, username: &str) -> std::result::Result<UserInfo, LoginFailure>;

    async fn logout(&mut self) -> std::result::Result<(), LoginFailure>;
}

/// Hexagonal port for outbound notifications.
///
/// Delivery failures are reported as `false` and never raised: a lost
/// notification must not change an account's outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> bool;

    async fn send_error_notification(&self, error: &Error, context: &[(&str, &str)]) -> bool;
}
