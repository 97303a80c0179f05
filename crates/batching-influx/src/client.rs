// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Database client abstraction
//!
//! The batching layer never talks to InfluxDB itself. It hands each batch to
//! a [`PointWriter`], which owns the wire protocol, authentication and
//! transport.
//!
//! # Implementations
//!
//! Any HTTP or UDP InfluxDB driver can be wrapped. Render a batch with
//! [`crate::point::encode_batch`] to get a Line Protocol body.

use crate::error::BoxError;
use crate::point::Point;
use crate::url::ConnectionParams;
use async_trait::async_trait;
use std::sync::Arc;

/// Writes a batch of points to the database.
#[async_trait]
pub trait PointWriter: Send + Sync + 'static {
    /// Write one batch. Called exactly once per flush; never retried.
    async fn write_points(&self, points: Vec<Point>) -> Result<(), BoxError>;
}

#[async_trait]
impl<W: PointWriter> PointWriter for Arc<W> {
    async fn write_points(&self, points: Vec<Point>) -> Result<(), BoxError> {
        (**self).write_points(points).await
    }
}

/// Builds a database client from parsed connection parameters.
pub trait FromConnectionParams: Sized {
    fn from_params(params: ConnectionParams) -> Result<Self, BoxError>;
}
