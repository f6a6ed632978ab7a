// TUI widget modules, one per tab plus the shared bars and overlays.

pub mod auth;
pub mod categories;
pub mod chat;
pub mod confirm;
pub mod dashboard;
pub mod help_bar;
pub mod statistics;
pub mod status_bar;
pub mod transaction_form;
pub mod transactions;
