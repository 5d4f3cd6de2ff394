use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::markup::decode_body;
use crate::{DecodeError, TransportError};

/// A request that can be sent any number of times.
///
/// The body is held as [`Bytes`], so every retry sends a fresh, cheap copy of
/// the original payload.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl PreparedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(
        url: Url,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Self, TransportError> {
        let mut request = Self::new(Method::POST, url).with_header(CONTENT_TYPE.as_str(), content_type)?;
        request.body = Some(body.into());
        Ok(request)
    }

    /// Sets `name`, replacing any earlier value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|err| TransportError::InvalidHeader {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|err| TransportError::InvalidHeader {
            name: name.to_string(),
            message: err.to_string(),
        })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct SessionResponse {
    status: StatusCode,
    url: Url,
    headers: HeaderMap,
    reason: Option<String>,
    body: Bytes,
}

impl SessionResponse {
    pub(crate) fn new(status: StatusCode, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            url,
            headers,
            reason: None,
            body,
        }
    }

    pub(crate) fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status line text, kept only when it differs from the standard one.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// URL the response came from, after any followed redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header_str(CONTENT_TYPE.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Result<String, DecodeError> {
        decode_body(&self.body, self.content_type())
    }

    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T, DecodeError> {
        serde_json::from_slice(&self.body).map_err(|source| DecodeError::Json {
            context: context.to_string(),
            source,
        })
    }

    pub fn check_status(&self, expected: StatusCode) -> Result<(), TransportError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TransportError::UnexpectedStatus {
                url: self.url.to_string(),
                status: self.status,
            })
        }
    }
}
