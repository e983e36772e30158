//! Client accounts

pub mod service;
pub mod validation;

pub use service::ClientService;
pub use validation::{ClientName, ValidationError};
