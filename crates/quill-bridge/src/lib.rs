// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod protocol;
pub mod service;

pub use protocol::{envelope_err, envelope_ok, SendParams};
pub use service::NodeBridge;
