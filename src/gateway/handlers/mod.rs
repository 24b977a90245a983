//! HTTP handlers

pub mod account;
pub mod health;
pub mod transfer;

pub use account::*;
pub use health::*;
pub use transfer::*;
