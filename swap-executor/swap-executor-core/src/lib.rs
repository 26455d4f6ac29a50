//! The swap executor, sequences the approvals, swap transactions and signed
//! orders of a single swap session
//!
//! A session accepts a quote through the [`readiness::QuoteTracker`], derives
//! a [`plan::StepPlan`] from it, optionally estimates fees up front with
//! [`preflight::preflight`], and hands the plan to an
//! [`executor::StepExecutor`] which drives it to completion.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]
#![deny(clippy::needless_pass_by_ref_mut)]

pub mod classifier;
pub mod cli;
pub mod collaborators;
pub mod error;
pub mod executor;
pub mod gas;
pub mod metrics;
pub mod orders;
pub mod plan;
pub mod preflight;
pub mod readiness;
pub mod relayer_client;
pub mod telemetry;

#[cfg(test)]
mod test_helpers;
