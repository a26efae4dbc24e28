// src/handlers.rs

pub mod auth;
pub mod catalog;
pub mod stock;
pub mod users;
