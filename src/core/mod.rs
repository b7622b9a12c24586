pub mod bus;
pub mod compiler;
pub mod config;
pub mod hero;
pub mod parser;
pub mod phrases;
pub mod session;
pub mod walker;
