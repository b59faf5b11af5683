// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0
//! kernelctl library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers behind the `kernelctl` binary

pub mod commands;
