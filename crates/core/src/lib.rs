// Core domain for the Reqhub requirements backend

pub mod access;
pub mod audit;
pub mod deletion;
pub mod error;
pub mod services;
pub mod status;
pub mod storage;
pub mod types;

pub use access::{Action, Actor, UserRole};
pub use error::{DomainError, DomainResult, TransactionFailure};
pub use types::*;
