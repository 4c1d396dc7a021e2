// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the entity store tables and the stage queues.

pub mod queue;
pub mod rate_limits;
pub mod transactions;
pub mod vendors;
