// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The four pipeline stages, in message-flow order.

pub mod enrich;
pub mod ingest;
pub mod notify;
pub mod post;

pub use enrich::enrich;
pub use ingest::{run_ingest, IngestReport};
pub use notify::notify;
pub use post::post;
