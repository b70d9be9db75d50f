use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Raised when a DSN cannot be parsed.
#[derive(Debug, Error)]
pub enum DsnParseError {
    /// The value is not a valid URL at all.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL scheme is not deliverable over HTTP.
    #[error("unsupported scheme: {0}")]
    InvalidScheme(String),
}

/// The absolute URL of the remote log ingestion endpoint.
///
/// Only `http` and `https` URLs are accepted; delivery is a plain POST of
/// a JSON batch to this address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn(Url);

impl Dsn {
    /// The endpoint URL.
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// The endpoint as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Dsn {
    type Err = DsnParseError;

    fn from_str(s: &str) -> Result<Dsn, DsnParseError> {
        let url: Url = s.parse()?;
        match url.scheme() {
            "http" | "https" => Ok(Dsn(url)),
            other => Err(DsnParseError::InvalidScheme(other.to_string())),
        }
    }
}

/// Helper trait to convert a value into an `Option<Dsn>`.
///
/// This converts a value into a DSN by parsing. The empty string or
/// unit values result in no DSN being parsed.
pub trait IntoDsn {
    /// Converts the value into a `Result<Option<Dsn>, E>`.
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError>;
}

impl<I: IntoDsn> IntoDsn for Option<I> {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        match self {
            Some(into_dsn) => into_dsn.into_dsn(),
            None => Ok(None),
        }
    }
}

impl IntoDsn for () {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        Ok(None)
    }
}

impl<'a> IntoDsn for &'a str {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        if self.is_empty() {
            Ok(None)
        } else {
            self.parse().map(Some)
        }
    }
}

impl IntoDsn for String {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        self.as_str().into_dsn()
    }
}

impl<'a> IntoDsn for Cow<'a, str> {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        let s: &str = &self;
        s.into_dsn()
    }
}

impl IntoDsn for Url {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        self.as_str().into_dsn()
    }
}

impl<'a> IntoDsn for &'a Dsn {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        Ok(Some(self.clone()))
    }
}

impl IntoDsn for Dsn {
    fn into_dsn(self) -> Result<Option<Dsn>, DsnParseError> {
        Ok(Some(self))
    }
}
