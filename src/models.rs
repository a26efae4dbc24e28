// src/models.rs

pub mod auth;
pub mod catalog;
pub mod stock;
