pub mod access;
pub mod auth_service;
