// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Subscription activation core
//!
//! Everything the activation workflow needs, independent of any transport:
//! the plan catalog, activity evaluation, the encrypted credential vault, the
//! billing and provisioning clients, and the orchestrator that ties them
//! together. The HTTP boundary lives in the api crate and only speaks to this
//! one through [`ActivationService`] and [`vault::CredentialVault`].

pub mod activation;
pub mod billing;
pub mod catalog;
pub mod config;
pub mod error;
pub mod expiration;
pub mod notify;
pub mod password;
pub mod provisioning;
pub mod requests;
pub mod vault;

mod edge_case_tests;

pub use activation::{ActivationOutcome, ActivationService, ProvisioningReport};
pub use error::{CoreError, CoreResult, RemoteSystem};
