//! Login orchestration: retry policy, outcome classification, notification.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

use crate::{
    config::{LoginConfig, NotifyPolicy},
    domain::{Account, LoginFailure, RunSummary, UserInfo},
    formatting::{format_failure, format_success, format_unexpected, local_now},
    ports::{BbsClient, Notifier},
};

/// Delay before retry `n` (1-based): `base * 2^(n-1)`.
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}

/// Drives one BBS client through the daily sign-in of each account.
pub struct AutoSigner {
    bbs: Mutex<Box<dyn BbsClient>>,
    notifier: Arc<dyn Notifier>,
    cfg: LoginConfig,
    policy: NotifyPolicy,
}

impl AutoSigner {
    pub fn new(
        bbs: Box<dyn BbsClient>,
        notifier: Arc<dyn Notifier>,
        cfg: LoginConfig,
        policy: NotifyPolicy,
    ) -> Self {
        Self {
            bbs: Mutex::new(bbs),
            notifier,
            cfg,
            policy,
        }
    }

    /// Sign in one account and report the outcome.
    ///
    /// Never fails: every error is classified, reported and turned into `false`.
    /// Logout is attempted exactly once, whatever happened before.
    pub async fn login(&mut self, account: &Account) -> bool {
        let username = account.username.as_str();
        info!(account = username, "attempting PTT login");

        let ok = match self.login_with_retry(account).await {
            Ok(user) => {
                info!(
                    account = username,
                    login_count = user.login_count,
                    "signed in"
                );
                let now = local_now(self.cfg.timezone_hours);
                self.notify(&format_success(username, &user, now)).await;
                true
            }
            Err(LoginFailure::Other(text)) => {
                error!(account = username, error = %text, "unexpected error during login");
                self.notify(&format_unexpected(username, &text)).await;
                false
            }
            Err(failure) => {
                error!(account = username, error = %failure, "login failed");
                self.notify(&format_failure(username, &failure, &self.cfg.messages))
                    .await;
                false
            }
        };

        if let Err(e) = self.bbs.get_mut().logout().await {
            warn!(account = username, error = %e, "logout failed");
        } else {
            debug!(account = username, "logged out");
        }
        ok
    }

    /// Sign in every account in order. One account's failure never stops the rest.
    pub async fn batch_login(&mut self, accounts: &[Account]) -> RunSummary {
        let mut summary = RunSummary::new();
        for account in accounts {
            let ok = self.login(account).await;
            summary.record(&account.username, ok);
        }
        info!(
            succeeded = summary.success_count(),
            total = summary.len(),
            "batch login finished"
        );
        summary
    }

    /// Retries only transient failures, at most `max_retries` times.
    async fn login_with_retry(&self, account: &Account) -> Result<UserInfo, LoginFailure> {
        let base = self.cfg.retry_delay;
        let max = self.cfg.max_retries;
        let delays = (1..=max).map(move |n| backoff_delay(base, n));

        let mut attempt = 0u32;
        RetryIf::spawn(
            delays,
            move || {
                attempt += 1;
                if attempt > 1 {
                    warn!(
                        account = account.username.as_str(),
                        retry = attempt - 1,
                        max,
                        "retrying after transient login failure"
                    );
                }
                self.attempt(account)
            },
            LoginFailure::is_transient,
        )
        .await
    }

    async fn attempt(&self, account: &Account) -> Result<UserInfo, LoginFailure> {
        let mut bbs = self.bbs.lock().await;
        bbs.login(
            &account.username,
            &account.password,
            self.cfg.kick_other_session,
        )
        .await?;
        bbs.get_user(&account.username).await
    }

    async fn notify(&self, text: &str) {
        if self.policy == NotifyPolicy::Summary {
            return;
        }
        if !self.notifier.send(text).await {
            warn!("notification delivery failed");
        }
    }
}
