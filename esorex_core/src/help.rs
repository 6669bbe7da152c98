//! Human readable output: option listings, recipe help, man pages,
//! parameter dumps and generated configuration files.
//!
//! Everything here renders to a `String` so that callers decide where the
//! text goes; only [`create_config`] touches the file system.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::env::is_variable_name;
use crate::config::file::{quote, CONFIG_VERSION_MARKER};
use crate::error::{EsorexError, EsorexResult};
use crate::params::{choices_text, json, Constraint, ParamMode, ParamType, Parameter, ParameterList, SourceAnnotations};
use crate::plugin::RecipeInfo;
use crate::strings::{aux_info, fill, indent, key_description, wrap, COMMAND_LINE_PREFIX};
use crate::terminal::DEFAULT_TERM_WIDTH;
use crate::{PACKAGE, VERSION};

/// Directory below `$HOME` holding generated configuration files
pub const RC_DIR: &str = ".esorex";
pub const RC_EXTENSION: &str = ".rc";
pub const RC_BACKUP: &str = ".bak";

/// Help text of `param` as shown in listings: a full stop at the end, the
/// environment variable hint, enumeration choices and optionally the
/// current value in brackets.
pub fn describe(param: &Parameter, with_value: bool) -> String {
    let mut text = param.help().trim_end().to_string();
    if !text.ends_with('.') {
        text.push('.');
    }

    if param.is_enabled(ParamMode::Environment) {
        let var = param.alias(ParamMode::Environment);
        if is_variable_name(var) {
            text.push_str(" This option may also be set using the environment variable ");
            text.push_str(var);
            text.push('.');
        }
    }

    if let Constraint::Enum(choices) = param.constraint() {
        text.push_str(&format!(" <{}>", choices_text(choices)));
    }

    if with_value {
        text.push_str(&format!(" [{}]", param.value()));
    }
    text
}

/// Option listing of every CLI-enabled parameter (all of them with
/// `show_all`), followed by an empty line.
pub fn option_listing(list: &ParameterList, show_all: bool, width: usize) -> String {
    let mut out = String::new();
    for param in list.iter().filter(|p| show_all || p.is_enabled(ParamMode::CommandLine)) {
        out.push_str(&key_description(
            COMMAND_LINE_PREFIX,
            param.alias(ParamMode::CommandLine),
            &describe(param, true),
            width,
        ));
        out.push('\n');
    }
    out.push('\n');
    out
}

/// `Usage:` line and the options of `recipe`
pub fn usage(recipe: &str, list: &ParameterList, show_all: bool, width: usize) -> String {
    format!(
        "Usage: {p} [{p}-options] {r} [{r}-options] sof\n\nOptions:\n\n{}",
        option_listing(list, show_all, width),
        p = PACKAGE,
        r = recipe
    )
}

/// `--help` output of the caller itself
pub fn caller_help(list: &ParameterList, width: usize) -> String {
    usage("recipe", list, false, width)
}

/// `--help` output for a recipe. `library` is shown when given, which the
/// runner does at debug level.
pub fn recipe_help(
    info: &RecipeInfo,
    list: &ParameterList,
    library: Option<&Path>,
    show_all: bool,
    width: usize,
) -> String {
    let mut out = String::new();
    out.push_str(&wrap(&format!("Recipe: {} -- {}", info.name, info.synopsis), 2, width));
    out.push_str("\n\n");
    if let Some(library) = library {
        out.push_str(&wrap(&format!("Library: {}", library.display()), 2, width));
        out.push_str("\n\n");
    }
    out.push_str(&usage(&info.name, list, show_all, width));
    let pointer = format!(
        "For help on the options of {p} itself, please use the command '{p} --help' \
         (that is, without specifying any recipe name). For more information about the \
         recipe, one can also use the command '{p} --man-page {r}'.",
        p = PACKAGE,
        r = info.name
    );
    out.push_str(&wrap(&pointer, 0, width));
    out.push('\n');
    out
}

/// Man page of a recipe
pub fn man_page(info: &RecipeInfo, list: &ParameterList, show_all: bool, width: usize) -> String {
    let margin = 2;
    let right = width.saturating_sub(margin).max(20);
    let mut out = String::new();

    let head = format!("  {} -- ", info.name);
    out.push_str("\nNAME\n");
    out.push_str(&head);
    out.push_str(&fill(&info.synopsis, head.len(), head.len(), right));
    out.push_str("\n\n");

    out.push_str("SYNOPSIS\n");
    out.push_str(&format!(
        "  {p} [{p}-options] {r} [{r}-options] sof\n\n",
        p = PACKAGE,
        r = info.name
    ));

    out.push_str("DESCRIPTION\n");
    out.push_str(&indent(&format!("  {}", info.description), margin));
    out.push_str("\n\n");

    out.push_str("OPTIONS\n");
    match list.len() {
        0 => out.push_str("  No options are provided by this recipe.\n\n"),
        n => {
            out.push_str(if n > 1 {
                "  The following options are provided by this recipe.\n\n"
            } else {
                "  A single option is provided by this recipe.\n\n"
            });
            out.push_str(&option_listing(list, show_all, width));
            let note = format!(
                "Note that it is also possible to create a configuration file containing these \
                 options, along with suitable default values. Please refer to the details \
                 provided by the '{PACKAGE} --help' command."
            );
            out.push_str("  ");
            out.push_str(&fill(&note, margin, margin, right));
            out.push_str("\n\n");
        }
    }

    out.push_str("AUTHOR\n  ");
    out.push_str(&fill(&info.author, margin, margin, right));
    out.push_str("\n\n");

    out.push_str("BUGS\n  ");
    out.push_str(&fill(
        &format!("Please report any problems with this recipe to {}", info.email),
        margin,
        margin,
        right,
    ));
    out.push_str("\n\n");

    out.push_str("RELEASE\n  ");
    out.push_str(&format!("{} -- version {}", info.name, info.version_string()));
    out.push_str("\n\n");

    out.push_str("LICENSE\n  ");
    out.push_str(&indent(&info.copyright, margin));
    out.push('\n');
    out
}

/// `--params` listing: `key : value` per parameter. With `sources` the
/// origin of each value is printed below it.
pub fn params_listing(
    list: &ParameterList,
    header: &str,
    sources: Option<&SourceAnnotations>,
    width: usize,
) -> String {
    let mut out = format!("{header} :\n\n");
    for param in list.iter() {
        let alias = param.alias(ParamMode::CommandLine);
        out.push_str(&key_description("", alias, &param.value().to_string(), width));
        out.push('\n');
        if let Some(sources) = sources {
            let origin = sources.get(param.name()).unwrap_or("ambiguous...");
            out.push_str(&aux_info("", alias, origin, width));
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

/// `--recipes` listing of `(name, synopsis)` pairs
pub fn recipe_listing(recipes: &[(String, String)], width: usize) -> String {
    let mut out = String::from("List of Available Recipes :\n\n");
    for (name, synopsis) in recipes {
        out.push_str(&key_description("", name, synopsis, width));
        out.push('\n');
    }
    if recipes.is_empty() {
        out.push_str("  No recipes were found in the specified recipe directory.\n");
    }
    out.push('\n');
    out
}

/// Program banner printed at start-up
pub fn banner() -> String {
    format!("\n     ***** EsoRex, version {VERSION}  *****\n\n")
}

/// `--version` details
pub fn version_details() -> String {
    format!(
        "Libraries used: esorex_core {VERSION}\n\n\
         Copyright 2003-2018, European Southern Observatory.\n\
         Report bugs to <cpl-help@eso.org>.\n\n"
    )
}

/// Text of a configuration file for `list`, named `file_name` in its header.
///
/// Parameters that cannot be set from files are skipped; a parameter
/// without a sensible value is written commented out.
pub fn config_skeleton(list: &ParameterList, file_name: &str) -> String {
    let date = chrono::Local::now().format("%d-%b-%Y %H:%M:%S");
    let mut out = format!(
        "# File: {file_name}\n#\n\
         # Note: This configuration file has been automatically\n\
         {CONFIG_VERSION_MARKER}{VERSION}) program.\n#\n\
         # Date: {date}\n#\n#\n\n"
    );

    for param in list.iter().filter(|p| p.is_enabled(ParamMode::ConfigFile)) {
        let alias = param.alias(ParamMode::CommandLine);
        out.push_str(&format!("# {COMMAND_LINE_PREFIX}{alias}\n"));
        let comment = wrap(&describe(param, false), 2, DEFAULT_TERM_WIDTH - 2).replace("\n ", "\n#");
        out.push_str(&format!("# {comment}\n"));

        let mut value = param.value().to_string();
        if value.is_empty() {
            log::warn!(
                "No sensible default available for '{}{}'. The entry will be inserted into the configuration file, but will be commented out.",
                COMMAND_LINE_PREFIX,
                alias
            );
            out.push('#');
        } else if param.param_type() == ParamType::String {
            value = quote(&value);
        }
        out.push_str(&format!("{}={}\n\n", param.name(), value));
    }
    out.push_str("#\n# End of file\n");
    out
}

/// Where `--create-config` should write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigTarget {
    /// `$HOME/.esorex/<context>.rc`
    Default,
    Path(PathBuf),
}

impl ConfigTarget {
    /// Interpret the value of `--create-config`. `TRUE` (or no value)
    /// selects the default file, `FALSE` disables the option and anything
    /// else names a file.
    pub fn from_option(value: &str) -> Option<Self> {
        match value {
            "" | "TRUE" => Some(ConfigTarget::Default),
            "FALSE" => None,
            path => Some(ConfigTarget::Path(PathBuf::from(path))),
        }
    }

    /// Concrete file for `context`, creating `$HOME/.esorex` if needed.
    pub fn resolve(&self, context: &str, home: &Path) -> EsorexResult<PathBuf> {
        match self {
            ConfigTarget::Path(path) => Ok(path.clone()),
            ConfigTarget::Default => {
                let dir = home.join(RC_DIR);
                if !dir.is_dir() {
                    log::warn!(
                        "No global configuration directory exists. Creating global configuration directory '{}'",
                        dir.display()
                    );
                    fs::create_dir_all(&dir).map_err(|e| {
                        log::error!("Unable to create global configuration directory '{}'", dir.display());
                        EsorexError::file(&dir, e)
                    })?;
                }
                Ok(dir.join(format!("{context}{RC_EXTENSION}")))
            }
        }
    }
}

/// Write the configuration file for `list`, backing up an existing file
/// to `<file>.bak`. A `.json` file receives a JSON parameter dump instead.
/// Returns the path written.
pub fn create_config(
    target: &ConfigTarget,
    context: &str,
    home: &Path,
    list: &ParameterList,
    recipe: Option<&str>,
) -> EsorexResult<PathBuf> {
    let path = target.resolve(context, home)?;

    if path.is_file() {
        let backup = PathBuf::from(format!("{}{}", path.display(), RC_BACKUP));
        fs::copy(&path, &backup).map_err(|e| {
            log::error!("Unable to make a backup copy of the configuration file.");
            log::warn!("No attempt made to create a new configuration file.");
            EsorexError::file(&backup, e)
        })?;
        log::info!("Old configuration file copied to '{}'", backup.display());
    }

    log::info!("Creating configuration file '{}'", path.display());
    let contents = if path.extension().is_some_and(|e| e == "json") {
        log::info!("Writing configuration file in JSON format");
        json::to_json_string(list, recipe)?
    } else {
        config_skeleton(list, &path.display().to_string())
    };
    fs::write(&path, contents).map_err(|e| {
        log::error!("Unable to create configuration file '{}'", path.display());
        EsorexError::file(&path, e)
    })?;
    Ok(path)
}
