pub mod auth;
pub mod menu;
pub mod orders;
pub mod stats;
pub mod tables;
