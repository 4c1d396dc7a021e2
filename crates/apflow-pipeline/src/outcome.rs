// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expected stage results.

use strum::Display;

/// What a stage invocation did with its input.
///
/// Duplicates, loops, and unknown vendors are normal outcomes, not errors.
/// Unexpected failures are returned as `Err` instead so the worker can
/// redeliver the message.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StageOutcome {
    /// The input was handled and the next stage (if any) was fed.
    Processed,
    /// The input repeats work already done.
    Duplicate,
    /// The vendor could not be resolved, or needs manual allocation.
    Unknown,
    /// The input was deliberately ignored, with a short reason.
    Skipped(&'static str),
    /// The input was dropped after a failure that redelivery would not fix.
    Failed(String),
}
