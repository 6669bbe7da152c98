//! The options of `esorex` itself and what they do before a recipe runs.
//!
//! Every option is a parameter named `esorex.caller.<option>` with the
//! option name as command line alias and `ESOREX_<OPTION>` as environment
//! alias, so it can be set from `esorex.rc`, the environment or the
//! command line like any recipe parameter.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use esorex_core::fileutils::{directory_exists, file_exists};
use esorex_core::help::{self, ConfigTarget};
use esorex_core::params::SOURCE_CALLER_DEFAULT;
use esorex_core::plugin::{PluginDirectoryScanner, PluginRegistry};
use esorex_core::strings::split_list;
use esorex_core::terminal::term_width;
use esorex_core::{
    DefaultOpener, MessageLevel, ParamMode, Parameter, ParameterList, RunContext, PACKAGE, PACKAGE_RESOURCE,
};

const LEVELS: [&str; 5] = ["debug", "info", "warning", "error", "off"];

/// Full parameter name of a caller option
pub fn key(option: &str) -> String {
    format!("{PACKAGE_RESOURCE}.{option}")
}

fn env_name(option: &str) -> String {
    format!("ESOREX_{}", option.to_uppercase().replace('-', "_"))
}

/// Option with the usual aliases: `--<option>` and `ESOREX_<OPTION>`
fn option(name: &str, help: &str, default: impl Into<esorex_core::ParamValue>) -> Parameter {
    Parameter::new_value(&key(name), PACKAGE_RESOURCE, help, default)
        .with_alias(ParamMode::CommandLine, name)
        .with_alias(ParamMode::Environment, &env_name(name))
}

fn level(name: &str, help: &str) -> Parameter {
    Parameter::new_enum(&key(name), PACKAGE_RESOURCE, help, "info", LEVELS)
        .with_alias(ParamMode::CommandLine, name)
        .with_alias(ParamMode::Environment, &env_name(name))
}

/// Options without an environment variable
fn flag(name: &str, help: &str) -> Parameter {
    Parameter::new_value(&key(name), PACKAGE_RESOURCE, help, false).with_alias(ParamMode::CommandLine, name)
}

/// The caller parameter table, in listing order
pub fn parameters() -> ParameterList {
    [
        flag(
            "help",
            "Display this help and exit. When a recipe name is given as well, its help is shown too",
        )
        .disabled(ParamMode::ConfigFile),
        flag("version", "Display version information and exit").disabled(ParamMode::ConfigFile),
        option(
            "check-sof-exist",
            "When TRUE, every input file listed in the SOF must exist and be readable before the recipe is called",
            false,
        ),
        option("config", "Configuration file to be used for EsoRex", "").disabled(ParamMode::ConfigFile),
        option(
            "create-config",
            "Create a configuration file. TRUE writes 'esorex.rc' into the '.esorex' directory in the user's \
             $HOME, a file name writes that file instead. With a recipe on the command line the file is \
             written for the recipe ('recipename.rc'). An existing file is kept as 'filename.rc.bak'. \
             A name ending in .json selects the JSON format",
            "FALSE",
        )
        .disabled(ParamMode::ConfigFile),
        option(
            "link-dir",
            "Directory receiving a symbolic link to each product file. Whether links are made at all is \
             controlled by '--suppress-link'",
            "/tmp",
        ),
        option("log-dir", "Directory where to place the logfile", "."),
        option("log-file", "Filename of logfile", format!("{PACKAGE}.log")),
        level("log-level", "Severity threshold of messages written to the logfile"),
        option("no-datamd5", "Do not compute the MD5 data hash of FITS product files", false),
        option("no-checksum", "Do not compute the standard FITS checksums of product files", false),
        option(
            "man-page",
            "Display a manual page for the given recipe and exit. Without a recipe this option does nothing. \
             See also '--help'",
            false,
        )
        .disabled(ParamMode::ConfigFile),
        option("mem-check", "Report on memory status at completion of recipe execution", false),
        level("msg-level", "Severity threshold of messages printed to the terminal"),
        option(
            "output-dir",
            "Directory the product files are finally moved to (products are first created in the current \
             directory)",
            ".",
        ),
        option(
            "output-prefix",
            "Prefix applied to any output file: with 'pre', 'filename.fits' becomes 'pre_0000.fits'. See \
             also '--suppress-prefix'",
            "out",
        ),
        option(
            "output-readonly",
            "When TRUE, product files in the output directory are made read-only for user, group and other. \
             When FALSE, the default permissions apply",
            false,
        ),
        option("paf-config", "Configuration file for creation of PAF files", ""),
        option(
            "params",
            "List the EsoRex parameters and their current settings, labelled by alias. With a recipe, its \
             parameters are listed as well",
            false,
        ),
        option(
            "products-sof",
            "Output file listing the FITS files created by the recipe. A name ending in .json selects the \
             JSON format",
            "",
        ),
        option(
            "recipes",
            "Display a list of all recipes found below the directories given with '--recipe-dir'",
            false,
        ),
        option("recipe-config", "Configuration file for the selected recipe", ""),
        option(
            "recipe-dir",
            "Directory containing recipe libraries. EsoRex searches all sub-directories as well. Several \
             starting directories may be given, separated by colons (:)",
            ".",
        )
        .with_alias(ParamMode::Environment, "ESOREX_PLUGIN_DIR"),
        flag(
            "show-hidden",
            "When TRUE, recipe parameters declared as hidden are shown by the help and man page options",
        ),
        option(
            "suppress-link",
            "When TRUE, no symbolic link to the products is created. When FALSE, a link is created in the \
             directory given with '--link-dir' for each product",
            true,
        ),
        option(
            "suppress-prefix",
            "When TRUE, products keep the name given by the recipe. When FALSE, they are renamed to the \
             \"prefix_number\" format, see '--output-prefix'",
            false,
        ),
        option("time", "Measure and show the recipe's execution time", false),
        option(
            "unload-plugin",
            "When TRUE, the recipe library is unloaded after execution. FALSE keeps it loaded, so that tools \
             like valgrind can resolve its symbols",
            true,
        ),
    ]
    .into_iter()
    .collect()
}

/// Record the EsoRex default as the source of every caller parameter
pub fn record_defaults(list: &ParameterList, ctx: &mut RunContext) {
    for param in list.iter() {
        ctx.sources.record(param.name(), SOURCE_CALLER_DEFAULT);
    }
}

/// What is left to do once the caller options were handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Run the recipe with the arguments that followed its name
    Recipe { name: String, args: Vec<String> },
    /// Informational output only; the program is done
    Done,
    /// No recipe on the command line
    Idle,
}

fn text<'a>(list: &'a ParameterList, option: &str) -> &'a str {
    list.get_string(&key(option)).unwrap_or_default()
}

fn enabled(list: &ParameterList, option: &str) -> bool {
    list.get_bool(&key(option)).unwrap_or(false)
}

/// Value of an option that was set somewhere other than its default
fn explicit<'a>(list: &'a ParameterList, option: &str) -> Option<&'a str> {
    list.find(&key(option))
        .filter(|p| p.is_explicit())
        .map(|p| p.value().as_str().unwrap_or_default())
}

fn message_level(list: &ParameterList, option: &str) -> Result<MessageLevel> {
    text(list, option).parse().map_err(|e: String| anyhow!(e))
}

/// Apply the message thresholds chosen by `--msg-level` and `--log-level`
pub fn apply_levels(list: &ParameterList, ctx: &RunContext) -> Result<()> {
    ctx.messenger.set_terminal_level(message_level(list, "msg-level")?);
    ctx.messenger.set_file_level(message_level(list, "log-level")?);
    Ok(())
}

/// Validate the caller options and perform the actions that do not need a
/// recipe. Informational text goes to `out`.
pub fn handle(
    list: &ParameterList,
    ctx: &RunContext,
    recipe: Option<String>,
    recipe_args: Vec<String>,
    home: Option<&Path>,
    out: &mut dyn Write,
) -> Result<Next> {
    let width = term_width();
    let help = enabled(list, "help");

    warn_missing_recipe_dirs(text(list, "recipe-dir"));

    if enabled(list, "version") {
        out.write_all(help::version_details().as_bytes())?;
        return Ok(Next::Done);
    }

    if help && recipe.is_none() {
        out.write_all(help::caller_help(list, width).as_bytes())?;
    }

    if enabled(list, "params") {
        let debug = ctx.messenger.terminal_level() == MessageLevel::Debug;
        let sources = debug.then_some(&ctx.sources);
        out.write_all(help::params_listing(list, "Caller Parameters", sources, width).as_bytes())?;
    }

    required_file(list, "config")?;
    required_file(list, "recipe-config")?;

    let log_dir = text(list, "log-dir");
    if log_dir.is_empty() {
        bail!("'--log-dir' is a mandatory option, but no argument was given");
    }
    if !directory_exists(log_dir) {
        bail!("'--log-dir={}' specified, but '{}' is not a valid directory.", log_dir, log_dir);
    }
    if text(list, "log-file").is_empty() {
        bail!("'--log-file' is a mandatory option, but no argument was given");
    }

    if enabled(list, "recipes") {
        let opener = DefaultOpener::new();
        let dirs = split_list(text(list, "recipe-dir"), ':').into_vec();
        let candidates = PluginDirectoryScanner::new(&opener).candidates(&dirs);
        let recipes = PluginRegistry::new(&opener, &dirs.join(":")).list_recipes(&candidates);
        out.write_all(help::recipe_listing(&recipes, width).as_bytes())?;
        return Ok(Next::Done);
    }

    if !help {
        check_output(list)?;
        if !enabled(list, "suppress-link") {
            let link_dir = text(list, "link-dir");
            if !directory_exists(link_dir) {
                if !link_dir.is_empty() {
                    log::error!("The argument to '--link-dir' [{}] is not a valid directory", link_dir);
                }
                bail!("Non-valid directory given for symbolic links.");
            }
        }
    }

    if recipe.is_none() {
        if let Some(target) = explicit(list, "create-config").and_then(ConfigTarget::from_option) {
            let home = home.ok_or_else(|| anyhow!("could not find home directory"))?;
            help::create_config(&target, PACKAGE, home, list, None)?;
        }
    }

    if let Some(paf) = explicit(list, "paf-config") {
        if paf.is_empty() {
            bail!("'--paf-config' was specified, but no argument given.");
        }
        if !file_exists(paf) {
            bail!("'--paf-config={}' specified, but '{}' could not be opened for reading.", paf, paf);
        }
    }
    if explicit(list, "products-sof").is_some_and(str::is_empty) {
        bail!("'--products-sof' was specified, but no argument given.");
    }

    out.flush()?;
    Ok(match recipe {
        Some(name) => Next::Recipe {
            name,
            args: recipe_args,
        },
        None => Next::Idle,
    })
}

fn required_file(list: &ParameterList, option: &str) -> Result<()> {
    match explicit(list, option) {
        None => Ok(()),
        Some("") => bail!("'--{}' was specified, but no argument was given.", option),
        Some(path) if !file_exists(path) => {
            bail!("'--{}={}' was specified, but the file '{}' could not be found.", option, path, path)
        }
        Some(_) => Ok(()),
    }
}

fn check_output(list: &ParameterList) -> Result<()> {
    let output_dir = text(list, "output-dir");
    if !directory_exists(output_dir) {
        if !output_dir.is_empty() {
            log::error!("The argument to '--output-dir' [{}] is not a valid directory", output_dir);
        }
        bail!("No destination given for program output (use the option '--output-dir').");
    }
    if text(list, "output-prefix").is_empty() && !enabled(list, "suppress-prefix") {
        log::error!("Use '--help' (without specifying any recipe) for help on these command options");
        bail!("No valid prefix has been given using the '--output-prefix' option.");
    }
    Ok(())
}

fn warn_missing_recipe_dirs(value: &str) {
    if value.is_empty() {
        return;
    }
    let dirs = split_list(value, ':');
    if dirs.iter().any(|dir| directory_exists(dir)) {
        return;
    }
    let noun = if dirs.len() < 2 { "directory" } else { "directories" };
    log::warn!(
        "Only non-existent {}, '{}', specified as argument to '--recipe-dir'. (Hint: use the '--params' \
         option to check on how EsoRex or the shell interpreted any environment variables, etc.)",
        noun,
        value
    );
}

/// Path of an explicitly requested local configuration file: the
/// `--config` option wins over `ESOREX_CONFIG`.
pub fn local_config(args: &[String], env: Option<String>) -> Option<PathBuf> {
    esorex_core::config::prescan_option(args, "config")
        .filter(|v| !v.is_empty())
        .or(env.filter(|v| !v.is_empty()))
        .map(|v| PathBuf::from(esorex_core::fileutils::tilde_replace(&v)))
}
