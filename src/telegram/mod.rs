//! Telegram surface: bot setup, command handlers, texts and the archive transport.

pub mod archive;
pub mod bot;
pub mod handlers;
pub mod messages;
pub mod status;

pub use archive::{ArchiveTransport, TelegramArchive};
pub use bot::{Command, create_bot, setup_bot_commands};
pub use handlers::schema;
