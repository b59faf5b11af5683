// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface that exposes a [`Kernel`](crate::Kernel) to its peers. No
//! business logic lives here; handlers delegate to the kernel components.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`sys_api`] | HTTP (Axum) | `/health`, identity, RPC dispatch and log retrieval |

pub mod sys_api;

pub use sys_api::{router, MethodError, RpcMethods};
