// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! portbus gateway daemon
//!
//! Runs a single [`portbus::Gateway`] bound to UDP, for processes whose only
//! job is to bridge or relay: the backbone routes (`0.0.1`, `1.0.1`,
//! `1.0.2`) or a channel route whose endpoints live in other processes.
//!
//! # Quick Start
//!
//! ```bash
//! # Application backbone, relaying between channel 2 and the chip route
//! portbus-gateway --id 1.0.1 --bind 0.0.0.0:7601 \
//!     --peer 1.2.1=10.0.0.2:7602 --peer 1.0.2=10.0.0.3:7600
//!
//! # Using config file
//! portbus-gateway --config gateway.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [gateway]
//! id = "1.0.1"
//! priority = 80
//!
//! [queue]
//! kind = "double"
//!
//! [udp]
//! bind = "0.0.0.0:7601"
//!
//! [[udp.peers]]
//! id = "1.2.1"
//! addr = "10.0.0.2:7602"
//! ```

pub mod config;
pub mod daemon;

pub use config::{ConfigError, DaemonConfig, GatewaySection};
pub use daemon::{Daemon, DaemonError};
