// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching InfluxDB writer
//!
//! Decouples producers of metric points from the database write path.
//!
//! This crate provides:
//! - A point cache flushed every `flush_interval` or once `max_batch_size`
//!   points are pending
//! - Abort of periodic flushing after `max_failed_attempts` consecutive
//!   failed writes, until explicitly restarted
//! - `influxdb://[user:pass@]host:port/database` connection string parsing
//! - YAML configuration
//! - Line Protocol rendering of points
//!
//! # Overview
//!
//! The crate does NOT speak the InfluxDB wire protocol. Each batch is handed
//! to a [`PointWriter`] supplied by the embedding application.
//!
//! ```text
//! add_point --> PointCache --(timer | size threshold)--> on_flush --> PointWriter
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod point;
pub mod scheduler;
pub mod url;

pub use client::{FromConnectionParams, PointWriter};
pub use config::{BatchConfig, ConfigError, InfluxConfig};
pub use error::{BoxError, Error, Result};
pub use point::{encode_batch, FieldValue, Point};
pub use scheduler::{BatchingInflux, FlushOutcome, SchedulerState, SchedulerStats};
pub use url::{parse_connection_string, ConnectionParams, ConnectionTarget};
