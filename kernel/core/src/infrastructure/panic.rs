// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Rendering of payloads caught by `catch_unwind`.

use std::any::Any;

/// Message carried by a panic payload (`&str` or `String`).
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
