// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod bus;
pub mod envelope;
pub mod transport;

pub use bus::{BusError, MessageBus};
pub use envelope::{Envelope, EnvelopeKind};
pub use transport::{DirectTransport, Transport};
