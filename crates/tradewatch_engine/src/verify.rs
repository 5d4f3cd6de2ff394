//! Anti-forgery token handling on top of [`Session`].
//!
//! Every request sent through a session goes through [`Session::execute`]: a
//! 403 whose body carries one of the configured failure signatures is a token
//! rejection, and the server's replacement token (from the CSRF header) is
//! attached to a fresh copy of the request before it is sent again. The number
//! of sends is bounded by `SessionSettings::max_token_attempts`.

use reqwest::StatusCode;
use tradewatch_logging::{redact, watch_debug, watch_warn};
use url::form_urlencoded;

use crate::markup::verification_inputs;
use crate::settings::parse_url;
use crate::{
    Error, PreparedRequest, ResultExt, Session, SessionResponse, SessionSettings,
    VerificationError, FORM_CONTENT_TYPE,
};

impl Session {
    /// Sends `request`, retrying while the server rejects the anti-forgery token.
    pub async fn execute(&self, request: PreparedRequest) -> Result<SessionResponse, Error> {
        let settings = self.settings();
        let max_attempts = settings.max_token_attempts.max(1);
        let mut request = request;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let response = self.send_once(&request).await?;
            let Some(token) = refreshed_token(&response, settings) else {
                return Ok(response);
            };

            if token.is_empty() {
                watch_warn!(
                    "{} {} rejected the anti-forgery token without sending {}",
                    request.method(),
                    request.url(),
                    settings.csrf_header
                );
                return Err(VerificationError::TokenMissing {
                    header: settings.csrf_header.clone(),
                    attempts,
                }
                .into());
            }
            if attempts >= max_attempts {
                watch_warn!(
                    "{} {} still rejects the anti-forgery token after {} attempts",
                    request.method(),
                    request.url(),
                    attempts
                );
                return Err(VerificationError::RetriesExhausted {
                    header: settings.csrf_header.clone(),
                    attempts,
                }
                .into());
            }

            watch_debug!(
                "{} {} rejected the anti-forgery token, retrying with {} (attempt {})",
                request.method(),
                request.url(),
                redact(token),
                attempts + 1
            );
            request = request.with_header(&settings.csrf_header, token)?;
        }
    }

    /// Builds a form POST to `target` carrying the verification inputs found on
    /// `source` (or on `target` itself when `source` is `None` or empty).
    pub async fn new_verified_request(
        &self,
        target: &str,
        source: Option<&str>,
    ) -> Result<PreparedRequest, Error> {
        let source = source.filter(|source| !source.is_empty()).unwrap_or(target);
        let target_url = parse_url(target)?;

        let page = self
            .get(source)
            .await
            .context("initial verification retrieval request failed")?;
        page.check_status(StatusCode::OK)
            .context("initial verification retrieval request failed")?;
        let html = page
            .text()
            .with_context(|| format!("failed to read verification page {source}"))?;

        let names = &self.settings().verification_inputs;
        let inputs = verification_inputs(&html, names).context("failed to get verification inputs")?;
        let header_token = names.first().and_then(|primary| {
            page.header_str(primary)
                .filter(|value| !value.is_empty())
                .map(|value| (primary.as_str(), value))
        });

        if inputs.is_empty() && header_token.is_none() {
            return Err(VerificationError::NoTokenOnPage {
                url: source.to_string(),
            }
            .into());
        }

        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&inputs)
            .finish();
        let mut request = PreparedRequest::post(target_url, FORM_CONTENT_TYPE, body)?;
        if let Some((name, value)) = header_token {
            request = request.with_header(name, value)?;
        }
        Ok(request)
    }
}

/// `Some(token)` when `response` is a token rejection; the token is empty when
/// the server sent no replacement.
fn refreshed_token<'r>(response: &'r SessionResponse, settings: &SessionSettings) -> Option<&'r str> {
    if response.status() != StatusCode::FORBIDDEN {
        return None;
    }
    let reason = response.reason().unwrap_or("");
    let body = String::from_utf8_lossy(response.body());
    let rejected = settings
        .token_failure_signatures
        .iter()
        .any(|signature| reason.contains(signature.as_str()) || body.contains(signature.as_str()));
    if !rejected {
        return None;
    }
    Some(response.header_str(&settings.csrf_header).unwrap_or("").trim())
}
