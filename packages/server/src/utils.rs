pub mod auth;
pub mod test_setup;
pub mod websocket;
