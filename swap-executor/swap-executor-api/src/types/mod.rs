//! API types for the swap executor

pub mod gas;
pub mod orders;
pub mod quote;
pub mod settings;
pub mod steps;
pub mod tx;

/// The sentinel amount used to reset an existing allowance
pub const APPROVE_RESET_AMOUNT: &str = "0";
