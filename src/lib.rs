pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod response;
pub mod server;
pub mod tools;
pub mod wellness;
