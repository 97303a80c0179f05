// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection string parsing.
//!
//! Both of these shapes are accepted:
//!
//! ```text
//! influxdb://{username}:{password}@{host}:{port}/{database}
//! influxdb://{host}:{port}/{database}
//! ```
//!
//! Any URL scheme is accepted in place of `influxdb`.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://(.*?):(.*?)/(.*)$").expect("valid url regex")
});

static URL_WITH_CREDENTIALS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://(.*?):(.*?)@(.*?):(.*?)/(.*)$")
        .expect("valid credentials url regex")
});

/// Scheme used when rendering parameters back into a connection string.
const DEFAULT_SCHEME: &str = "influxdb";

/// Connection parameters handed to the database client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionParams {
    /// Parameters without credentials.
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Attach username and password.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Render back into a connection string, password included.
    ///
    /// Parsing the result yields parameters equal to `self`.
    pub fn to_connection_string(&self) -> String {
        self.render(false)
    }

    fn render(&self, mask_password: bool) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let pass = if mask_password { "***" } else { pass.as_str() };
                format!(
                    "{}://{}:{}@{}:{}/{}",
                    DEFAULT_SCHEME, user, pass, self.host, self.port, self.database
                )
            }
            _ => format!(
                "{}://{}:{}/{}",
                DEFAULT_SCHEME, self.host, self.port, self.database
            ),
        }
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl FromStr for ConnectionParams {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_connection_string(s)
    }
}

/// Parse a connection string into [`ConnectionParams`].
///
/// A string containing `@` must match the credentialed shape in full; it
/// never falls back to the plain shape.
pub fn parse_connection_string(url: &str) -> Result<ConnectionParams> {
    let malformed = || Error::MalformedConnectionString(url.to_string());

    if url.contains('@') {
        let caps = URL_WITH_CREDENTIALS_RE.captures(url).ok_or_else(malformed)?;
        let port = caps[4].parse::<u16>().map_err(|_| malformed())?;
        Ok(ConnectionParams::new(&caps[3], port, &caps[5]).with_credentials(&caps[1], &caps[2]))
    } else {
        let caps = URL_RE.captures(url).ok_or_else(malformed)?;
        let port = caps[2].parse::<u16>().map_err(|_| malformed())?;
        Ok(ConnectionParams::new(&caps[1], port, &caps[3]))
    }
}

/// Where the database client should connect to.
///
/// `Debug` masks the password in both forms.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConnectionTarget {
    /// A connection string, resolved with [`parse_connection_string`].
    Url { url: String },
    /// Already structured parameters.
    Params(ConnectionParams),
}

impl ConnectionTarget {
    /// Resolve into connection parameters, parsing the string form.
    pub fn resolve(self) -> Result<ConnectionParams> {
        match self {
            ConnectionTarget::Url { url } => parse_connection_string(&url),
            ConnectionTarget::Params(params) => Ok(params),
        }
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Url { url } => f
                .debug_struct("Url")
                .field("url", &mask_password(url))
                .finish(),
            ConnectionTarget::Params(params) => f.debug_tuple("Params").field(params).finish(),
        }
    }
}

/// Replace the password of a credentialed connection string with `***`.
fn mask_password(url: &str) -> Cow<'_, str> {
    match URL_WITH_CREDENTIALS_RE.captures(url).and_then(|caps| caps.get(2)) {
        Some(pass) => Cow::Owned(format!("{}***{}", &url[..pass.start()], &url[pass.end()..])),
        None => Cow::Borrowed(url),
    }
}

impl From<&str> for ConnectionTarget {
    fn from(url: &str) -> Self {
        ConnectionTarget::Url {
            url: url.to_string(),
        }
    }
}

impl From<String> for ConnectionTarget {
    fn from(url: String) -> Self {
        ConnectionTarget::Url { url }
    }
}

impl From<ConnectionParams> for ConnectionTarget {
    fn from(params: ConnectionParams) -> Self {
        ConnectionTarget::Params(params)
    }
}
