use reqwest::StatusCode;
use thiserror::Error;
use tradewatch_core::HighWaterMark;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("redirect from {url} rejected: {message}")]
    Redirect { url: String, message: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {url} too large (max {max_bytes}, actual {actual:?})")]
    TooLarge {
        url: String,
        max_bytes: u64,
        actual: Option<u64>,
    },
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: StatusCode },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session cookie is empty")]
    EmptyCookie,
    #[error("invalid base url {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("you are not logged in")]
    NotLoggedIn,
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("no verification token found on {url}")]
    NoTokenOnPage { url: String },
    #[error("invalid verification input selector for {name}: {message}")]
    Selector { name: String, message: String },
    #[error("failed to retrieve {header}: token rejected and no replacement sent (attempt {attempts})")]
    TokenMissing { header: String, attempts: usize },
    #[error("retried {attempts} times and {header} is still rejected")]
    RetriesExhausted { header: String, attempts: usize },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse json from {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode body as {encoding}")]
    Charset { encoding: String },
    #[error("unexpected {field} in {context}: {message}")]
    Field {
        context: String,
        field: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to encode {context}: {source}")]
    Encode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("user not found: {query}")]
    UserNotFound { query: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error beneath any added context.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Adds operation context to errors as they cross component boundaries.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, Error>;

    fn with_context<F>(self, context: F) -> Result<T, Error>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, context: impl Into<String>) -> Result<T, Error> {
        self.map_err(|err| err.into().context(context))
    }

    fn with_context<F>(self, context: F) -> Result<T, Error>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| err.into().context(context()))
    }
}

/// One failed poll cycle. The poller keeps running from `mark`.
#[derive(Debug, Error)]
#[error("poll from mark {mark} failed: {source}")]
pub struct PollError {
    pub mark: HighWaterMark,
    #[source]
    pub source: Error,
}
