// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The apflow invoice routing pipeline.
//!
//! Stages (`ingest -> enrich -> post -> notify`) communicate only through
//! queues and coordinate only through the entity store's atomic primitives.
//! Around them sit the safety mechanisms:
//!
//! - [`dedup`]: message-id and content-hash duplicate detection, and the claim
//! - [`loop_guard`]: inbound skip rules and outbound recipient policy
//! - [`vendor`]: vendor ledger resolution
//! - [`rate_limit`]: per-identity request limiting for the webhook surface
//! - [`mailer`]: the guarded path every outbound email takes

pub mod context;
pub mod dedup;
pub mod loop_guard;
pub mod mailer;
pub mod outcome;
pub mod rate_limit;
pub mod stages;
pub mod vendor;
pub mod worker;

pub use context::{Collaborators, PipelineContext, PipelineSettings};
pub use loop_guard::{LoopGuard, SkipReason};
pub use outcome::StageOutcome;
pub use rate_limit::{RateDecision, RateLimiter};
pub use vendor::{Resolution, VendorResolver};
pub use worker::{StageHandler, StageWorker};
