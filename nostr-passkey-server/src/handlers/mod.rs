//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod login;
pub mod register;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use login::{authentication_options, verify_authentication};
pub use register::{registration_options, verify_registration};
