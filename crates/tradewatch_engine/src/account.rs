use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tradewatch_core::{Direction, HighWaterMark, Transaction};
use tradewatch_logging::{watch_info, watch_warn};

use crate::poller::start_polling;
use crate::session::stop_redirects;
use crate::settings::endpoint;
use crate::{
    AuthError, ClientSettings, Error, PollHandle, PreparedRequest, ResultExt, Session,
    TransactionFeed,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "UserID")]
    pub id: i64,
    #[serde(rename = "UserName")]
    pub name: String,
}

/// A logged-in user of the service.
#[derive(Debug, Clone)]
pub struct Account {
    session: Session,
    settings: ClientSettings,
    user_id: Arc<OnceCell<i64>>,
}

impl Account {
    pub fn login_with_cookie(cookie: &str, settings: ClientSettings) -> Result<Self, Error> {
        let session =
            Session::from_session_cookie(cookie, &settings.endpoints.web, settings.session.clone())
                .context("failed to create client")?;
        Ok(Self::from_session(session, settings))
    }

    pub fn from_session(session: Session, settings: ClientSettings) -> Self {
        Self {
            session,
            settings,
            user_id: Arc::new(OnceCell::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Id and name of the logged-in user.
    ///
    /// Redirects are not followed for this probe: the service redirects to its
    /// login page when the session cookie is no longer valid.
    pub async fn status(&self) -> Result<UserInfo, Error> {
        let url = endpoint(&self.settings.endpoints.web, "mobileapi/userinfo")?;
        let response = {
            let _no_follow = self.session.with_redirect_policy(stop_redirects());
            self.session
                .execute(PreparedRequest::get(url.clone()))
                .await
                .context("failed to retrieve user info")?
        };

        if response.status().is_redirection() {
            return Err(AuthError::NotLoggedIn.into());
        }
        response
            .check_status(StatusCode::OK)
            .context("failed to retrieve user info")?;
        let info: UserInfo = response.json(url.path())?;
        Ok(info)
    }

    /// Id of the logged-in user, probed once and cached.
    pub async fn user_id(&self) -> Result<i64, Error> {
        self.user_id
            .get_or_try_init(|| async { self.status().await.map(|info| info.id) })
            .await
            .copied()
    }

    /// Signs out every other session and re-authenticates this one.
    pub async fn relog(&self) -> Result<(), Error> {
        let web = &self.settings.endpoints.web;
        let target = endpoint(web, "authentication/signoutfromallsessionsandreauthenticate")?;
        let source = endpoint(web, "my/account#!/security")?;

        let request = self
            .session
            .new_verified_request(target.as_str(), Some(source.as_str()))
            .await
            .context("failed to create verified request")?;
        let response = self
            .session
            .execute(request)
            .await
            .context("relog request failed")?;
        response
            .check_status(StatusCode::OK)
            .context("relog request failed")?;
        Ok(())
    }

    /// Relogs every `relog_interval` in the background until the keeper is
    /// stopped or dropped. Failures are logged, not returned.
    pub fn maintain_session(&self) -> SessionKeeper {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(keep_alive(
            self.clone(),
            self.settings.relog_interval,
            cancel.clone(),
        ));
        SessionKeeper {
            cancel,
            task: Some(task),
        }
    }

    pub fn transactions(&self, user_id: i64, direction: Direction) -> TransactionFeed {
        TransactionFeed::new(
            self.session.clone(),
            &self.settings.endpoints,
            user_id,
            direction,
            self.settings.page_limit,
        )
    }

    /// Streams transactions newer than `mark`; pass
    /// [`HighWaterMark::UNINITIALIZED`] to only see ones made from now on.
    pub async fn track_transactions(
        &self,
        direction: Direction,
        mark: HighWaterMark,
    ) -> Result<PollHandle<Transaction>, Error> {
        let user_id = self
            .user_id()
            .await
            .context("failed to resolve user id for tracking")?;
        let feed = Arc::new(self.transactions(user_id, direction));
        watch_info!(
            "tracking {} transactions of user {}",
            feed.direction().as_query(),
            feed.user_id()
        );
        Ok(start_polling(feed, mark, &self.settings.poll))
    }

    pub async fn track_sales(&self, mark: HighWaterMark) -> Result<PollHandle<Transaction>, Error> {
        self.track_transactions(Direction::Sale, mark).await
    }
}

/// Background session maintenance started by [`Account::maintain_session`].
pub struct SessionKeeper {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionKeeper {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionKeeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn keep_alive(account: Account, every: Duration, cancel: CancellationToken) {
    let every = every.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match account.relog().await {
            Ok(()) => watch_info!("session refreshed"),
            Err(err) => watch_warn!("error while maintaining user session: {}", err),
        }
    }
}
