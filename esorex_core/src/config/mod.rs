//! Configuration sources: files, environment and command line.

pub mod cmdline;
pub mod env;
pub mod file;
pub mod resolver;

pub use cmdline::{parse_command_line, prescan_option, split_options, CommandLineMode, Positionals};
pub use env::{apply_environment, apply_environment_with, is_variable_name};
pub use file::{parse_config_file, parse_config_str, quote, CONFIG_VERSION_MARKER};
pub use resolver::ConfigResolver;
