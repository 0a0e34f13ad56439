pub mod chart;
pub mod config;
pub mod error;
pub mod gate;
pub mod page;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod table;
pub mod vanna;
pub mod warehouse;
