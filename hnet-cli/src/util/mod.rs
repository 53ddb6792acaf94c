pub mod command;
pub mod format;
pub mod logging;
pub mod prompt;
pub mod spinner;
