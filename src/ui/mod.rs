// Tue Jan 13 2026 - Alex

pub mod cli;
pub mod display;
pub mod progress;

pub use cli::{Args, CommandHandler};
pub use display::OutcomeDisplay;
pub use progress::ProgressManager;
