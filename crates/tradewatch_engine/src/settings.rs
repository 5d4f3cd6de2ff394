use std::time::Duration;

use url::Url;

use crate::TransportError;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    /// `Domain` attribute of the session cookie; `None` makes it host-only.
    pub cookie_domain: Option<String>,
    /// Header carrying the refreshed anti-forgery token on a rejection.
    pub csrf_header: String,
    /// Markup input names to harvest, primary first. Only the primary one is
    /// also read from a same-named response header.
    pub verification_inputs: Vec<String>,
    /// Body text identifying a 403 as a token rejection.
    pub token_failure_signatures: Vec<String>,
    /// Total sends per request, first attempt included.
    pub max_token_attempts: usize,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Redirects followed when no redirect hook is installed.
    pub redirect_limit: usize,
    pub max_body_bytes: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: ".ROBLOSECURITY".to_string(),
            cookie_domain: Some(".roblox.com".to_string()),
            csrf_header: "X-CSRF-TOKEN".to_string(),
            verification_inputs: vec!["__RequestVerificationToken".to_string()],
            token_failure_signatures: vec![
                "XSRF Token Validation Failed".to_string(),
                "Token Validation Failed".to_string(),
            ],
            max_token_attempts: 3,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 10,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Base URLs of the services the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub web: String,
    pub economy: String,
    pub users: String,
    pub api: String,
}

impl Endpoints {
    /// Every service behind one base URL (a local mock server or a proxy).
    pub fn all_at(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            web: base.clone(),
            economy: base.clone(),
            users: base.clone(),
            api: base,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            web: "https://www.roblox.com/".to_string(),
            economy: "https://economy.roblox.com/".to_string(),
            users: "https://users.roblox.com/".to_string(),
            api: "https://api.roblox.com/".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// Buffer of the internal update channel and of the outward item/error channels.
    pub channel_capacity: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            channel_capacity: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub session: SessionSettings,
    pub endpoints: Endpoints,
    pub poll: PollSettings,
    /// `limit` query parameter of the transaction listing.
    pub page_limit: u32,
    pub relog_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            endpoints: Endpoints::default(),
            poll: PollSettings::default(),
            page_limit: 100,
            relog_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, TransportError> {
    Url::parse(raw).map_err(|err| TransportError::InvalidUrl {
        url: raw.to_string(),
        message: err.to_string(),
    })
}

/// Resolves `path` below `base`, treating `base` as a directory.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url, TransportError> {
    let mut root = base.to_string();
    if !root.ends_with('/') {
        root.push('/');
    }
    let root = parse_url(&root)?;
    root.join(path).map_err(|err| TransportError::InvalidUrl {
        url: format!("{root}{path}"),
        message: err.to_string(),
    })
}
