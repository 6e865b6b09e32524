pub mod context_item;
pub mod duplicate_log;
pub mod question;
pub mod settings;
pub mod slot;
