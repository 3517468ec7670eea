// src/admin/handlers/mod.rs

pub mod users;
