// Library root: chat-completion client and prompt construction for the
// financial assistant.

pub mod client;
pub mod prompt;
pub mod protocol;
