pub mod codec;
pub mod commands;
pub mod connection;
pub mod formatter;
pub mod handler;
pub mod listener;
pub mod numerics;
pub mod parser;
