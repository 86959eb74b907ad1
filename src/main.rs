//! Thin CLI entry point binding the library's pieces into a runnable
//! process: load configuration, wire the Application Context, and drive
//! the Session Scheduler until shutdown.
//!
//! No site-specific scraping or downloading is implemented here — this
//! binary registers no adapters, so every check/download executes the
//! "no adapter registered" failure path documented on
//! [`series_watch::QueueManager`]. It exists to exercise the scheduling
//! core end-to-end from the command line; embedders are expected to
//! write their own thin binary that registers real adapters before
//! calling [`series_watch::SessionScheduler::run`].

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use series_watch::adapters::{ConsoleNotifier, NoOpCookieRefresher};
use series_watch::config::loader;
use series_watch::config::resolver::ConfigResolver;
use series_watch::context::AppContext;
use series_watch::downloaded_index::DownloadedIndex;
use series_watch::queue_manager::QueueManager;
use series_watch::session_scheduler::SessionScheduler;

struct Args {
    config_path: PathBuf,
    index_path: PathBuf,
    once: bool,
    debug: bool,
}

fn parse_args() -> Args {
    let mut config_path = PathBuf::from("./config.yaml");
    let mut index_path = PathBuf::from("./downloaded-index.json");
    let mut once = false;
    let mut debug = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(value) = args.next() {
                    config_path = PathBuf::from(value);
                }
            }
            "--index" => {
                if let Some(value) = args.next() {
                    index_path = PathBuf::from(value);
                }
            }
            "--once" => once = true,
            "--debug" => debug = true,
            other => {
                eprintln!("unrecognized argument: {other}");
            }
        }
    }

    Args {
        config_path,
        index_path,
        once,
        debug,
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "series_watch=debug" } else { "series_watch=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = parse_args();
    init_logging(args.debug);

    let doc = match loader::load(&args.config_path) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(error = %e, path = %args.config_path.display(), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let resolver = match ConfigResolver::build(&doc) {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let index = match DownloadedIndex::load(&args.index_path).await {
        Ok(index) => Arc::new(index),
        Err(e) => {
            tracing::error!(error = %e, path = %args.index_path.display(), "failed to load downloaded-episode index");
            return ExitCode::FAILURE;
        }
    };

    let context = Arc::new(AppContext::new(
        resolver,
        Arc::new(ConsoleNotifier),
        index,
        Arc::new(NoOpCookieRefresher),
    ));
    let manager = QueueManager::new(context.clone());
    let scheduler = SessionScheduler::new(context, manager, args.once, None, Some(args.config_path.clone()));

    if args.once {
        if let Err(e) = scheduler.run().await {
            tracing::error!(error = %e, "scheduler exited with an error");
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    let run_handle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    let (quit_tx, quit_rx) = tokio::sync::oneshot::channel();
    if std::io::stdin().is_terminal() {
        tokio::spawn(interactive_commands(scheduler.clone(), quit_tx));
    }

    tokio::select! {
        () = series_watch::run_with_shutdown(&scheduler) => {}
        _ = quit_rx => { scheduler.stop().await; }
    }

    match run_handle.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "scheduler exited with an error");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler task panicked");
            ExitCode::FAILURE
        }
    }
}

/// Reads `reload`/`trigger`/`quit` lines from stdin and dispatches them
/// to the Session Scheduler's operator actions (§4.5). Only spawned when
/// stdin is a TTY; exits on EOF or once `quit` sends on `quit_tx`.
async fn interactive_commands(
    scheduler: Arc<SessionScheduler>,
    quit_tx: tokio::sync::oneshot::Sender<()>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        match line.trim() {
            "reload" => match scheduler.reload().await {
                Ok(()) => tracing::info!("configuration reloaded"),
                Err(e) => tracing::error!(error = %e, "reload failed"),
            },
            "trigger" => {
                scheduler.trigger().await;
                tracing::info!("triggered an immediate check for every series");
            }
            "quit" => {
                let _ = quit_tx.send(());
                return;
            }
            "" => {}
            other => tracing::warn!(command = %other, "unrecognized interactive command"),
        }
    }
}
