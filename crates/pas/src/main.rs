use std::{future::Future, process::ExitCode, sync::Arc};

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument, Span};

use pas_core::{
    config::{Config, NotifyPolicy},
    domain::RunSummary,
    formatting::{format_summary, local_now},
    ports::Notifier,
    signer::AutoSigner,
    utils::hostname,
    Error,
};
use pas_ptt::PttClient;
use pas_telegram::TelegramNotifier;

/// Daily PTT sign-in with Telegram notifications.
#[derive(Debug, Parser)]
#[command(name = "pas", version)]
struct Args {
    /// Run the batch and print the outcome; exit non-zero if no account succeeded.
    #[arg(long)]
    test_login: bool,

    /// Print the loaded configuration with secrets masked and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.print_config {
        return match cfg.redacted_json() {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("cannot render configuration: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let _log_guard = match pas_core::logging::init("pas", &cfg.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("logging setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let run_span = if cfg.log.json && cfg.log.include_hostname {
        info_span!("run", host = %hostname())
    } else {
        Span::none()
    };

    let notifier: Arc<dyn Notifier> = match TelegramNotifier::new(cfg.notification.clone()) {
        Ok(n) => Arc::new(n),
        Err(e) => {
            error!(error = %e, "cannot build Telegram client");
            return ExitCode::FAILURE;
        }
    };

    let summary = match run(&cfg, notifier.clone()).instrument(run_span).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "run failed");
            notifier
                .send_error_notification(&e, &[("operation", "main"), ("status", "failed")])
                .await;
            return ExitCode::FAILURE;
        }
    };

    if args.test_login {
        print_summary(&summary);
        if summary.success_count() == 0 {
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

async fn run(cfg: &Config, notifier: Arc<dyn Notifier>) -> Result<RunSummary, Error> {
    info!(
        accounts = cfg.accounts.len(),
        policy = cfg.notify_policy.as_str(),
        "starting PTT sign-in"
    );

    let mut signer = AutoSigner::new(
        Box::new(PttClient::new(&cfg.login)),
        notifier.clone(),
        cfg.login.clone(),
        cfg.notify_policy,
    );
    let accounts = cfg.accounts.clone();

    // A panic inside the batch surfaces here instead of tearing down main.
    let summary = spawn_in_current_span(async move { signer.batch_login(&accounts).await })
        .await
        .map_err(|e| Error::External(format!("sign-in task aborted: {e}")))?;

    if !summary.all_succeeded() {
        warn!(failed = ?summary.failed_accounts(), "some accounts did not sign in");
    }

    if cfg.notify_policy == NotifyPolicy::Summary {
        let text = format_summary(&summary, local_now(cfg.login.timezone_hours));
        if !notifier.send(&text).await {
            warn!("summary notification not delivered");
        }
    }
    Ok(summary)
}

/// Spawned tasks start outside any span; carry the caller's along.
fn spawn_in_current_span<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fut.instrument(Span::current()))
}

fn print_summary(summary: &RunSummary) {
    println!(
        "PTT sign-in: {}/{} succeeded",
        summary.success_count(),
        summary.len()
    );
    for (username, ok) in summary.iter() {
        println!("  {} {username}", if ok { "OK  " } else { "FAIL" });
    }
}
