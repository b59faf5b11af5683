// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0
//! Constellation Kernel
//!
//! Runtime kernel embedded by every service of the constellation. Each
//! process builds one [`Kernel`] which owns:
//!
//! - the static service registry and URL resolution
//! - validated configuration and the process identity
//! - a bounded in-memory logger
//! - an in-process event bus
//! - a background job queue
//! - a versioned key/value state store
//! - an RPC client for peer calls
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Shared runtime for constellation services

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use application::{Kernel, KernelBuilder, KernelError};
pub use domain::*;
