//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Services own credentials, authorization and outbound email so route
//! handlers stay focused on request parsing and status codes. Persistence
//! lives in `crate::repository`.

pub mod auth;
pub mod email;
pub mod roles;
