pub mod chat;
pub mod config;
pub mod game;
pub mod message;
pub mod player;
pub mod role;
