pub mod commands;
pub mod runtime;

pub use runtime::BotRuntime;
