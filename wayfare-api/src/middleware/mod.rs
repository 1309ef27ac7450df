pub mod auth;

pub use auth::{
    session_auth, staff_auth, superadmin_api_auth, AuthorizationGate, ClientOrigin, Principal, Requirement,
};
