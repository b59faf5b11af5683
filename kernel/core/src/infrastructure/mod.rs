// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod logger;
pub(crate) mod panic;
pub mod registry;
pub mod repositories;
pub mod rpc_client;

pub use event_bus::{EventBus, Subscription};
pub use logger::Logger;
pub use registry::{RegistryError, ServiceRegistry};
pub use rpc_client::{RpcClient, RpcError, RpcErrorKind};
