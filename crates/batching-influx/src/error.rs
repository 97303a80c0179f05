// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types.

use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Opaque error produced by a database client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the batching writer.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection string matched neither supported shape, or its port
    /// is not a valid integer.
    #[error("Invalid InfluxDB url {0}")]
    MalformedConnectionString(String),

    /// The database client could not be built from the connection parameters.
    #[error("failed to connect to InfluxDB: {0}")]
    Connect(#[source] BoxError),

    /// The database client rejected a batch.
    #[error("failed to write points to InfluxDB: {0}")]
    WriteFailure(#[source] BoxError),

    /// The write did not complete within the configured timeout.
    #[error("write to InfluxDB timed out after {0:?}")]
    WriteTimeout(Duration),

    /// A point cannot be written (InfluxDB requires at least one field).
    #[error("invalid point for measurement '{0}': no fields")]
    InvalidPoint(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
