//! Interface de terminal (ratatui + crossterm).
//!
//! Três telas: input (pergunta + modo), pesquisa (raciocínio, relatório
//! parcial, id/status e logs) e resultado (relatório, citações e
//! follow-ups). O trabalho roda no runtime tokio via [`TuiAdapter`] e volta
//! como [`AppEvent`] por um canal std.

mod adapter;
mod app;
mod runner;
mod ui;

pub use adapter::TuiAdapter;
pub use app::{
    App, AppEvent, AppScreen, FollowupEntry, LogEntry, LogLevel, ResearchMode, TuiCommand,
};
pub use runner::{create_event_channel, handle_key, install_terminal_panic_hook, run_tui};
