//! API handlers for tessera.
//!
//! Auth endpoints live under [`auth`]; self-service profile endpoints under
//! [`users`]; workspace CRUD and membership under [`workspaces`].

pub mod auth;
pub mod health;
pub mod root;
pub mod users;
pub mod workspaces;
