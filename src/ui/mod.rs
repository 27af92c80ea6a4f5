pub mod app;
pub mod conversation;
pub mod tui;

pub use app::run;
