pub mod connection_router;
pub mod game_service;
pub mod game_session;
pub mod lobby;
pub mod night_resolver;
pub mod scheduler;
pub mod session_registry;
pub mod vote_validator;
pub mod win_evaluator;
