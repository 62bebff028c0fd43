pub mod common;
pub mod controller;
pub mod output;
pub mod receive;
pub mod send;
pub mod server;
pub mod ui;
pub mod utils;
