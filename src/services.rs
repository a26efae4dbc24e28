// src/services.rs

pub mod access;
pub mod auth;
pub mod catalog_service;
pub mod deduction_service;
pub mod ledger_query;
pub mod ledger_service;
pub mod user_service;
