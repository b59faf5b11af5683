// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

pub mod identity;
pub mod job_queue;
pub mod kernel;
pub mod state_manager;

pub use identity::{IdentityService, KERNEL_CAPABILITIES};
pub use job_queue::{JobContext, JobError, JobQueue};
pub use kernel::{Kernel, KernelBuilder, KernelError};
pub use state_manager::StateManager;
