// Library root: the application layer between the data backends, the LLM
// client and the terminal front end.

pub mod app;
pub mod auth;
pub mod backend;
pub mod chat;
pub mod export;
pub mod protocol;
pub mod reconcile;
