// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Shared vocabulary of the kernel: service roles and URLs, configuration,
//! identity, log entries, events, jobs, versioned state, the RPC envelope and
//! the storage traits.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and invariants, no I/O

pub mod config;
pub mod events;
pub mod identity;
pub mod job;
pub mod log;
pub mod repository;
pub mod rpc;
pub mod service;
pub mod state;
