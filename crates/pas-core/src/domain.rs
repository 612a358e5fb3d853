use std::fmt;

/// A single PTT credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// User record returned by the BBS after a successful login.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Number of days the user has logged in.
    pub login_count: u32,
    /// Mailbox status line, as shown by the BBS.
    pub mail: String,
}

/// Failure conditions reported by a BBS client.
///
/// Everything the client does not recognise ends up in `Other` with the
/// original error text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoginFailure {
    #[error("no such user")]
    NoSuchUser,

    #[error("wrong id or password")]
    WrongIdOrPassword,

    #[error("wrong password")]
    WrongPassword,

    #[error("login too often")]
    LoginTooOften,

    #[error("using too many resources")]
    UseTooManyResources,

    #[error("unregistered user")]
    UnregisteredUser,

    #[error("{0}")]
    Other(String),
}

impl LoginFailure {
    /// Rate-limit style rejections that are expected to clear after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LoginFailure::LoginTooOften | LoginFailure::UseTooManyResources
        )
    }
}

/// Per-account outcome of one run, in processing order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    results: Vec<(String, bool)>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. A username seen twice keeps its latest outcome.
    pub fn record(&mut self, username: &str, success: bool) {
        if let Some(slot) = self.results.iter_mut().find(|(u, _)| u == username) {
            slot.1 = success;
        } else {
            self.results.push((username.to_string(), success));
        }
    }

    pub fn get(&self, username: &str) -> Option<bool> {
        self.results
            .iter()
            .find(|(u, _)| u == username)
            .map(|(_, ok)| *ok)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.results.iter().map(|(u, ok)| (u.as_str(), *ok))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|(_, ok)| *ok).count()
    }

    pub fn failed_accounts(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, ok)| !*ok)
            .map(|(u, _)| u.as_str())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.success_count() == self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_debug_hides_password() {
        let a = Account::new("alice", "hunter2");
        let dbg = format!("{a:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn transient_conditions() {
        assert!(LoginFailure::LoginTooOften.is_transient());
        assert!(LoginFailure::UseTooManyResources.is_transient());
        assert!(!LoginFailure::WrongPassword.is_transient());
        assert!(!LoginFailure::Other("boom".into()).is_transient());
    }

    #[test]
    fn summary_counts_and_keeps_order() {
        let mut s = RunSummary::new();
        s.record("alice", true);
        s.record("bob", false);
        s.record("carol", true);
        assert_eq!(s.len(), 3);
        assert_eq!(s.success_count(), 2);
        assert_eq!(s.failed_accounts(), vec!["bob"]);
        assert!(!s.all_succeeded());
        let names: Vec<&str> = s.iter().map(|(u, _)| u).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }
}
