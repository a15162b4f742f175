//! Typed clients for the greet and blog services

pub mod blog;
pub mod greet;

pub use blog::BlogClient;
pub use greet::GreetClient;
