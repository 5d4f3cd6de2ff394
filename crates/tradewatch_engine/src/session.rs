use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use futures_util::StreamExt;
use hyper::ext::ReasonPhrase;
use reqwest::cookie::Jar;
use reqwest::redirect::{Action, Attempt, Policy};
use reqwest::StatusCode;
use tradewatch_logging::{redact, watch_debug, watch_info};
use url::{form_urlencoded, Url};

use crate::settings::parse_url;
use crate::{
    AuthError, Error, PreparedRequest, SessionResponse, SessionSettings, TransportError,
    FORM_CONTENT_TYPE,
};

/// What to do with a redirect the server asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectAction {
    Follow,
    /// Hand the redirect response itself back to the caller.
    Stop,
    Reject(String),
}

/// The redirect being decided on.
#[derive(Debug)]
pub struct RedirectAttempt<'a> {
    pub status: StatusCode,
    pub next: &'a Url,
    pub previous: &'a [Url],
}

pub type RedirectHook = Arc<dyn Fn(&RedirectAttempt<'_>) -> RedirectAction + Send + Sync>;

/// Hook that treats every redirect as a terminal response.
pub fn stop_redirects() -> RedirectHook {
    Arc::new(|_: &RedirectAttempt<'_>| RedirectAction::Stop)
}

type HookSlot = Arc<RwLock<Option<RedirectHook>>>;

/// Cookie-bearing HTTP transport shared by every call of a logged-in client.
///
/// Cloning is cheap; clones share the cookie jar and the redirect hook.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: reqwest::Client,
    redirect: HookSlot,
    base_url: Url,
    settings: SessionSettings,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.base_url.as_str())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Builds a transport whose jar holds the given session cookie, scoped to
    /// `base_url` (or to `settings.cookie_domain` when set).
    pub fn from_session_cookie(
        cookie: &str,
        base_url: &str,
        settings: SessionSettings,
    ) -> Result<Self, AuthError> {
        if cookie.trim().is_empty() {
            return Err(AuthError::EmptyCookie);
        }
        let base_url = Url::parse(base_url).map_err(|err| AuthError::InvalidBaseUrl {
            url: base_url.to_string(),
            message: err.to_string(),
        })?;

        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(&session_cookie(cookie, &base_url, &settings), &base_url);

        let redirect: HookSlot = Arc::new(RwLock::new(None));
        let policy_slot = redirect.clone();
        let redirect_limit = settings.redirect_limit;
        let policy = Policy::custom(move |attempt| decide_redirect(&policy_slot, redirect_limit, attempt));

        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .redirect(policy)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(AuthError::ClientBuild)?;

        watch_info!(
            "session created for {} with cookie {}",
            base_url,
            redact(cookie)
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                redirect,
                base_url,
                settings,
            }),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub async fn get(&self, url: &str) -> Result<SessionResponse, Error> {
        self.execute(PreparedRequest::get(parse_url(url)?)).await
    }

    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<SessionResponse, Error> {
        let request = PreparedRequest::post(parse_url(url)?, content_type, body)?;
        self.execute(request).await
    }

    pub async fn post_form<K, V>(&self, url: &str, values: &[(K, V)]) -> Result<SessionResponse, Error>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(values)
            .finish();
        self.post(url, FORM_CONTENT_TYPE, body).await
    }

    /// Replaces the redirect hook and returns the previous one. `None` restores
    /// plain following up to the configured limit.
    pub fn set_redirect_policy(&self, hook: Option<RedirectHook>) -> Option<RedirectHook> {
        let mut slot = self
            .inner
            .redirect
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, hook)
    }

    /// Installs `hook` until the returned guard is dropped.
    pub fn with_redirect_policy(&self, hook: RedirectHook) -> RedirectGuard {
        let previous = self.set_redirect_policy(Some(hook));
        RedirectGuard {
            slot: self.inner.redirect.clone(),
            previous,
        }
    }

    /// One send, no token handling. The whole body is buffered.
    pub(crate) async fn send_once(
        &self,
        request: &PreparedRequest,
    ) -> Result<SessionResponse, TransportError> {
        let url = request.url().clone();
        let mut builder = self
            .inner
            .client
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        watch_debug!("{} {}", request.method(), url);
        let response = builder
            .send()
            .await
            .map_err(|err| map_reqwest_error(&url, err))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned());
        let max_bytes = self.inner.settings.max_body_bytes;

        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(TransportError::TooLarge {
                    url: final_url.to_string(),
                    max_bytes,
                    actual: Some(content_len),
                });
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| map_reqwest_error(&final_url, err))?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(TransportError::TooLarge {
                    url: final_url.to_string(),
                    max_bytes,
                    actual: Some(next_len),
                });
            }
            body.extend_from_slice(&chunk);
        }

        watch_debug!("{} {} -> {} ({} bytes)", request.method(), url, status, body.len());
        Ok(SessionResponse::new(status, final_url, headers, Bytes::from(body)).with_reason(reason))
    }
}

/// Restores the previous redirect hook when dropped, on every exit path.
#[must_use = "the temporary redirect policy is removed as soon as the guard drops"]
pub struct RedirectGuard {
    slot: HookSlot,
    previous: Option<RedirectHook>,
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = self.previous.take();
    }
}

fn session_cookie(value: &str, base_url: &Url, settings: &SessionSettings) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly", settings.cookie_name, value.trim());
    if let Some(domain) = settings.cookie_domain.as_deref() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if base_url.scheme() == "https" {
        cookie.push_str("; Secure");
    }
    cookie
}

fn decide_redirect(slot: &HookSlot, redirect_limit: usize, attempt: Attempt<'_>) -> Action {
    let hook = slot.read().unwrap_or_else(PoisonError::into_inner).clone();
    let Some(hook) = hook else {
        return if attempt.previous().len() >= redirect_limit {
            attempt.error("redirect limit exceeded")
        } else {
            attempt.follow()
        };
    };

    let action = {
        let info = RedirectAttempt {
            status: attempt.status(),
            next: attempt.url(),
            previous: attempt.previous(),
        };
        hook(&info)
    };
    match action {
        RedirectAction::Follow => attempt.follow(),
        RedirectAction::Stop => attempt.stop(),
        RedirectAction::Reject(reason) => attempt.error(reason),
    }
}

fn map_reqwest_error(url: &Url, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout {
            url: url.to_string(),
        };
    }
    if err.is_redirect() {
        return TransportError::Redirect {
            url: url.to_string(),
            message: err.to_string(),
        };
    }
    TransportError::Request {
        url: url.to_string(),
        source: err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_secure_only_over_https() {
        let settings = SessionSettings::default();
        let https = Url::parse("https://www.roblox.com/").unwrap();
        let cookie = session_cookie("abc", &https, &settings);
        assert_eq!(
            cookie,
            ".ROBLOSECURITY=abc; Path=/; HttpOnly; Domain=.roblox.com; Secure"
        );

        let local = SessionSettings {
            cookie_domain: None,
            ..SessionSettings::default()
        };
        let http = Url::parse("http://127.0.0.1:9000/").unwrap();
        assert_eq!(
            session_cookie("abc", &http, &local),
            ".ROBLOSECURITY=abc; Path=/; HttpOnly"
        );
    }

    #[test]
    fn empty_cookie_is_refused() {
        let err = Session::from_session_cookie("  ", "https://www.roblox.com/", SessionSettings::default())
            .unwrap_err();
        assert!(matches!(err, AuthError::EmptyCookie));
    }

    #[test]
    fn invalid_base_url_is_refused() {
        let err = Session::from_session_cookie("abc", "::nope", SessionSettings::default()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn guard_restores_previous_hook() {
        let session =
            Session::from_session_cookie("abc", "https://www.roblox.com/", SessionSettings::default())
                .unwrap();
        assert!(session.set_redirect_policy(None).is_none());
        {
            let _guard = session.with_redirect_policy(stop_redirects());
            let installed = session.set_redirect_policy(None);
            assert!(installed.is_some());
            // Put it back so the guard has something to replace.
            session.set_redirect_policy(installed);
        }
        assert!(session.set_redirect_policy(None).is_none());
    }
}
