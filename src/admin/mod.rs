// src/admin/mod.rs

pub mod guard;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod validators;


pub use routes::admin_routes;
