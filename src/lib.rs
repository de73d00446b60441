pub mod config;
pub mod hal;
pub mod messages;
pub mod route;
pub mod runtime;
pub mod servo;
pub mod sim;
