//! Command-line tracker: logs in with a session cookie and prints every new
//! sale (or purchase) as it shows up.
//!
//! Usage: `tradewatch_app [CONFIG]`, where CONFIG defaults to `tradewatch.ron`.

mod config;
mod logging;
mod state;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tradewatch_engine::{Account, AuthError, Error, PollEvent};
use tradewatch_logging::{watch_error, watch_info, watch_warn};

use crate::config::{AppConfig, COOKIE_VAR, DEFAULT_CONFIG};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = AppConfig::load(&config_path)?;
    logging::initialize(config.log, config.verbose);

    let cookie = config.session_cookie(env::var(COOKIE_VAR).ok())?;
    let account = Account::login_with_cookie(&cookie, config.client_settings())
        .context("failed to set up session")?;
    let user = account
        .status()
        .await
        .context("session cookie was not accepted")?;
    watch_info!("Logged in as {} ({})", user.name, user.id);

    let direction = config.track.direction();
    let start = match &config.state_file {
        Some(path) => state::load_mark(path, direction),
        None => tradewatch_core::HighWaterMark::UNINITIALIZED,
    };

    let keeper = config.maintain_session.then(|| account.maintain_session());
    let mut handle = account
        .track_transactions(direction, start)
        .await
        .context("failed to start tracking")?;
    let mut marks = handle.mark_updates();

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(PollEvent::Item(transaction)) => println!("{transaction}"),
                Some(PollEvent::Error(err)) => {
                    if matches!(err.source.root(), Error::Auth(AuthError::NotLoggedIn)) {
                        watch_error!("Session expired, stopping: {}", err);
                        handle.cancel();
                    } else {
                        watch_warn!("{}", err);
                    }
                }
                None => break,
            },
            changed = marks.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(path) = &config.state_file {
                    let mark = *marks.borrow_and_update();
                    state::save_mark(path, direction, mark);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                watch_info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let last = handle.shutdown().await;
    if let Some(path) = &config.state_file {
        state::save_mark(path, direction, last);
    }
    if let Some(keeper) = keeper {
        keeper.shutdown().await;
    }
    watch_info!("Stopped at mark {}", last);
    Ok(())
}
