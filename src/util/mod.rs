pub mod command;
pub mod host;
pub mod paths;
