//! Command line pass.
//!
//! Options are long options of the form `--alias[=value]`, one per
//! command-line enabled parameter. Option parsing stops at the first
//! argument that does not start with `-` (or after `--`):
//!
//! ```text
//! esorex --time --output-dir=/tmp/out vimos_bias --par1=9 bias.sof
//! └─ caller options ─────────────────┘ └ recipe ┘ └ recipe options + SOF ┘
//! ```
//!
//! The option parser is generated with the `clap` builder API from the
//! parameter list. Unique prefixes of an option are accepted and a repeated
//! option overrides the earlier occurrence.

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Arg, ArgAction, Command};

use crate::error::ConfigError;
use crate::params::{ParamMode, ParamType, ParameterList, SourceAnnotations, SOURCE_COMMAND_LINE};

/// What the arguments after the options mean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLineMode {
    /// First positional is a recipe name, everything after it belongs to it
    Caller,
    /// All positionals are SOF paths
    Recipe,
}

/// Positional arguments left after option parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Positionals {
    Caller {
        recipe: Option<String>,
        recipe_args: Vec<String>,
    },
    Recipe {
        sof_files: Vec<String>,
    },
}

/// Split `args` into option tokens and the positional remainder.
pub fn split_options(args: &[String]) -> (&[String], &[String]) {
    match args.iter().position(|a| a == "--" || !a.starts_with('-') || a == "-") {
        Some(i) if args[i] == "--" => (&args[..i], &args[i + 1..]),
        Some(i) => (&args[..i], &args[i..]),
        None => (args, &[]),
    }
}

/// Value of `--name=value` among the option tokens of `args`, last one wins.
/// Used to locate the local configuration file before the real pass.
pub fn prescan_option(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("--{name}=");
    let (options, _) = split_options(args);
    options
        .iter()
        .rev()
        .find_map(|a| a.strip_prefix(&prefix).map(str::to_string))
}

fn option_key(param: &crate::params::Parameter, use_param_names: bool) -> &str {
    if use_param_names {
        param.name()
    } else {
        param.alias(ParamMode::CommandLine)
    }
}

/// Apply the options in `args` to `list` and return the positionals.
pub fn parse_command_line(
    list: &mut ParameterList,
    args: &[String],
    mode: CommandLineMode,
    use_param_names: bool,
    sources: &mut SourceAnnotations,
) -> Result<Positionals, ConfigError> {
    let (options, rest) = split_options(args);
    list.renumber();

    let mut command = Command::new(crate::PACKAGE)
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .infer_long_args(true)
        .args_override_self(true);
    for param in list.iter().filter(|p| p.is_enabled(ParamMode::CommandLine)) {
        command = command.arg(
            Arg::new(param.id().to_string())
                .long(option_key(param, use_param_names).to_string())
                .num_args(0..=1)
                .require_equals(true)
                .action(ArgAction::Set),
        );
    }

    let matches = command
        .try_get_matches_from(options)
        .map_err(|err| unknown_option(&err, options))?;

    let ids: Vec<usize> = list
        .iter()
        .filter(|p| p.is_enabled(ParamMode::CommandLine))
        .map(|p| p.id())
        .collect();
    for id in ids {
        let key = id.to_string();
        if !matches.contains_id(&key) {
            continue;
        }
        let value = matches
            .get_raw(&key)
            .and_then(|mut values| values.next_back())
            .map(|v| v.to_string_lossy().into_owned());
        let Some(param) = list.find_by_id_mut(id) else {
            continue;
        };
        let option = option_key(param, use_param_names).to_string();
        match value {
            None => {
                let implicit = match param.param_type() {
                    ParamType::Bool => Some("TRUE"),
                    ParamType::String => Some(""),
                    ParamType::Int | ParamType::Double => None,
                };
                param.set_from_string(implicit, SOURCE_COMMAND_LINE, sources)?;
            }
            Some(v) if v.is_empty() => {
                log::error!("Option '--{}' requires a value", option);
                return Err(ConfigError::MissingValue(option));
            }
            Some(v) => param.set_from_string(Some(&v), SOURCE_COMMAND_LINE, sources)?,
        }
    }

    let rest = rest.to_vec();
    Ok(match mode {
        CommandLineMode::Caller => {
            let mut rest = rest.into_iter();
            Positionals::Caller {
                recipe: rest.next(),
                recipe_args: rest.collect(),
            }
        }
        CommandLineMode::Recipe => Positionals::Recipe { sof_files: rest },
    })
}

fn unknown_option(err: &clap::Error, options: &[String]) -> ConfigError {
    let option = match err.get(ContextKind::InvalidArg) {
        Some(ContextValue::String(s)) => s.clone(),
        _ => match err.kind() {
            ErrorKind::UnknownArgument => options.join(" "),
            _ => err.to_string().trim().to_string(),
        },
    };
    log::error!("Option '{}' is not recognized", option);
    ConfigError::UnknownOption(option)
}
