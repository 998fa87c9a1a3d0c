//! Core identifiers for Noema

pub mod account;
pub mod entity;
