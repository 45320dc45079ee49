//! HTTP request handlers

pub mod cache;
pub mod health;
pub mod proxy;
