//! PTT telnet adapter.
//!
//! This crate implements the `pas-core` BbsClient port by driving the BBS
//! screens directly over a telnet connection.

pub mod screen;
pub mod telnet;

use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{timeout, Instant},
};
use tracing::{debug, info, warn};

use pas_core::{
    config::LoginConfig,
    domain::{LoginFailure, UserInfo},
    ports::BbsClient,
};

use crate::{
    screen::{detect, parse_user_info, render, Prompt},
    telnet::TelnetCodec,
};

/// Left arrows back out of any submenu to the main menu.
const GO_MAIN_MENU: &str = "\x1b[D\x1b[D\x1b[D\x1b[D";

/// Screens the login sequence may pass through before the main menu.
const MAX_LOGIN_STEPS: usize = 16;

type Outcome<T> = std::result::Result<T, LoginFailure>;

fn io_failure(what: &str, e: std::io::Error) -> LoginFailure {
    LoginFailure::Other(format!("{what}: {e}"))
}

struct Session {
    stream: TcpStream,
    codec: TelnetCodec,
    screen: Vec<u8>,
}

impl Session {
    async fn connect(host: &str, port: u16, limit: Duration) -> Outcome<Self> {
        let stream = match timeout(limit, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(io_failure("connect failed", e)),
            Err(_) => {
                return Err(LoginFailure::Other(format!(
                    "connect to {host}:{port} timed out"
                )))
            }
        };
        debug!(host, port, "connected to PTT");
        Ok(Self {
            stream,
            codec: TelnetCodec::default(),
            screen: Vec::new(),
        })
    }

    /// Send keystrokes. The screen buffer is cleared so the next wait only
    /// sees what the server draws in response.
    async fn send(&mut self, keys: &str) -> Outcome<()> {
        self.screen.clear();
        let bytes = telnet::escape(&screen::encode(keys));
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|e| io_failure("write failed", e))
    }

    /// Read until one of `wanted` shows up on screen.
    async fn wait_for(&mut self, wanted: &[Prompt], limit: Duration) -> Outcome<(Prompt, String)> {
        let deadline = Instant::now() + limit;
        let mut buf = [0u8; 4096];
        loop {
            let text = render(&self.screen);
            if let Some(prompt) = detect(&text, wanted) {
                debug!(?prompt, "screen detected");
                return Ok((prompt, text));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let n = match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    return Err(LoginFailure::Other(
                        "connection closed by PTT".to_string(),
                    ))
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(io_failure("read failed", e)),
                Err(_) => {
                    return Err(LoginFailure::Other(
                        "timed out waiting for PTT screen".to_string(),
                    ))
                }
            };

            let mut replies = Vec::new();
            self.codec
                .decode(&buf[..n], &mut self.screen, &mut replies);
            if !replies.is_empty() {
                self.stream
                    .write_all(&replies)
                    .await
                    .map_err(|e| io_failure("write failed", e))?;
            }
        }
    }

    async fn wait(&mut self, limit: Duration) -> Outcome<(Prompt, String)> {
        self.wait_for(Prompt::ALL, limit).await
    }
}

/// Telnet client for a PTT-style BBS. Holds at most one session.
pub struct PttClient {
    host: String,
    port: u16,
    timeout: Duration,
    session: Option<Session>,
}

impl PttClient {
    pub fn new(cfg: &LoginConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            timeout: cfg.connection_timeout,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn drive_login(
        &self,
        s: &mut Session,
        username: &str,
        password: &str,
        kick_other_session: bool,
    ) -> Outcome<()> {
        let (prompt, _) = s.wait(self.timeout).await?;
        if let Some(failure) = prompt.failure() {
            return Err(failure);
        }
        if prompt != Prompt::AskUsername {
            return Err(LoginFailure::Other(format!(
                "unexpected screen before login: {prompt:?}"
            )));
        }

        // A trailing comma skips the welcome animation.
        s.send(&format!("{username},\r")).await?;

        for _ in 0..MAX_LOGIN_STEPS {
            let (prompt, _) = s.wait(self.timeout).await?;
            if let Some(failure) = prompt.failure() {
                return Err(failure);
            }
            match prompt {
                Prompt::AskPassword => s.send(&format!("{password}\r")).await?,
                Prompt::DuplicateSession => {
                    let answer = if kick_other_session { "y\r" } else { "n\r" };
                    info!(kick_other_session, "duplicate session prompt");
                    s.send(answer).await?
                }
                Prompt::DeleteFailedLog => s.send("n\r").await?,
                Prompt::UnfinishedPost => s.send("q\r").await?,
                Prompt::PressAnyKey => s.send("\r").await?,
                Prompt::MainMenu => return Ok(()),
                // Sent back to the id prompt: credentials were rejected.
                Prompt::AskUsername => return Err(LoginFailure::WrongIdOrPassword),
                other => {
                    return Err(LoginFailure::Other(format!(
                        "unexpected screen during login: {other:?}"
                    )))
                }
            }
        }
        Err(LoginFailure::Other(
            "login did not reach the main menu".to_string(),
        ))
    }
}

#[async_trait]
impl BbsClient for PttClient {
    async fn login(
        &mut self,
        username: &str,
        password: &str,
        kick_other_session: bool,
    ) -> Outcome<()> {
        self.session = None;
        let mut s = Session::connect(&self.host, self.port, self.timeout).await?;
        self.drive_login(&mut s, username, password, kick_other_session)
            .await?;
        info!(username, "reached PTT main menu");
        self.session = Some(s);
        Ok(())
    }

    async fn get_user(&mut self, username: &str) -> Outcome<UserInfo> {
        let limit = self.timeout;
        let s = self
            .session
            .as_mut()
            .ok_or_else(|| LoginFailure::Other("not logged in".to_string()))?;

        s.send(&format!("{GO_MAIN_MENU}T\rQ\r{username}\r")).await?;
        let (prompt, text) = s
            .wait_for(&[Prompt::NoSuchUser, Prompt::UserQuery], limit)
            .await?;
        if prompt == Prompt::NoSuchUser {
            return Err(LoginFailure::NoSuchUser);
        }

        let info = match parse_user_info(&text) {
            Some(info) => info,
            // Header drawn before the fields; wait for the bottom line.
            None => {
                let (_, text) = s.wait_for(&[Prompt::PressAnyKey], limit).await?;
                parse_user_info(&text).ok_or_else(|| {
                    LoginFailure::Other("unreadable user query screen".to_string())
                })?
            }
        };
        if let Err(e) = s.send("\r").await {
            debug!(error = %e, "dismissing query screen failed");
        }
        Ok(info)
    }

    async fn logout(&mut self) -> Outcome<()> {
        let Some(mut s) = self.session.take() else {
            return Ok(());
        };
        s.send(&format!("{GO_MAIN_MENU}G\r")).await?;
        s.wait_for(&[Prompt::Goodbye], self.timeout).await?;
        s.send("Y\r").await?;
        if let Err(e) = s.stream.shutdown().await {
            warn!(error = %e, "closing PTT connection failed");
        }
        debug!("logged out of PTT");
        Ok(())
    }
}
