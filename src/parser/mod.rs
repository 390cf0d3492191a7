pub mod commands;
pub mod condition;
pub mod labels;
pub mod listing;

pub use commands::{parse_console_command, ConsoleCommand, CONSOLE_HELP};
pub use condition::translate_condition;
pub use labels::{parse_number, Labels, SymbolTable};
pub use listing::Listing;
