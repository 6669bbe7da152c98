//! Ordered configuration passes for the caller and for recipes.
//!
//! Caller: global file, local file, environment, command line. Recipe:
//! `~/.esorex/<recipe>.rc`, `--recipe-config`, environment, the options
//! after the recipe name. Both end with `postprocess_defaults` and tilde
//! expansion of string values.

use std::path::Path;

use super::cmdline::{parse_command_line, CommandLineMode, Positionals};
use super::env::apply_environment_with;
use super::file::parse_config_file;
use crate::context::RunContext;
use crate::error::{EsorexResult, FileError};
use crate::params::ParameterList;

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Runs the configuration passes over a parameter list.
pub struct ConfigResolver {
    use_param_names: bool,
    lookup: EnvLookup,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    /// Resolver reading the process environment
    pub fn new() -> Self {
        Self {
            use_param_names: false,
            lookup: Box::new(|var| std::env::var(var).ok()),
        }
    }

    /// Replace the environment lookup (tests, embedding)
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    /// Use full parameter names instead of CLI aliases as option names
    pub fn use_param_names(mut self, yes: bool) -> Self {
        self.use_param_names = yes;
        self
    }

    pub fn env_var(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
    }

    /// Resolve the caller parameters and return the recipe name and its
    /// arguments.
    ///
    /// Errors in the global file are reported and otherwise ignored; a
    /// missing local file is fatal.
    pub fn resolve_caller(
        &self,
        list: &mut ParameterList,
        ctx: &mut RunContext,
        global: Option<&Path>,
        local: Option<&Path>,
        args: &[String],
    ) -> EsorexResult<Positionals> {
        if let Some(path) = global {
            if path.is_file() {
                if let Err(e) = parse_config_file(list, path, &mut ctx.sources) {
                    log::warn!("Problem with global configuration file '{}': {}", path.display(), e);
                }
            } else {
                log::debug!("No global configuration file '{}'", path.display());
            }
        }
        list.expand_tilde();

        if let Some(path) = local {
            self.required_file(list, ctx, path)?;
        }

        apply_environment_with(list, &mut ctx.sources, &self.lookup)?;
        list.expand_tilde();

        let positionals = parse_command_line(
            list,
            args,
            CommandLineMode::Caller,
            self.use_param_names,
            &mut ctx.sources,
        )?;
        list.postprocess_defaults();
        list.expand_tilde();
        Ok(positionals)
    }

    /// Resolve recipe parameters and return the SOF arguments.
    ///
    /// `recipe_rc` is the per-recipe file in the user's configuration
    /// directory and is skipped when absent. `recipe_config` was requested
    /// explicitly, so it must exist.
    pub fn resolve_recipe(
        &self,
        list: &mut ParameterList,
        ctx: &mut RunContext,
        recipe_rc: Option<&Path>,
        recipe_config: Option<&Path>,
        args: &[String],
    ) -> EsorexResult<Vec<String>> {
        if let Some(path) = recipe_rc.filter(|p| p.is_file()) {
            parse_config_file(list, path, &mut ctx.sources)?;
            list.expand_tilde();
        }
        if let Some(path) = recipe_config {
            self.required_file(list, ctx, path)?;
        }
        apply_environment_with(list, &mut ctx.sources, &self.lookup)?;

        let positionals = parse_command_line(
            list,
            args,
            CommandLineMode::Recipe,
            self.use_param_names,
            &mut ctx.sources,
        )?;
        list.postprocess_defaults();
        list.expand_tilde();

        Ok(match positionals {
            Positionals::Recipe { sof_files } => sof_files,
            Positionals::Caller { recipe, recipe_args } => recipe.into_iter().chain(recipe_args).collect(),
        })
    }

    fn required_file(&self, list: &mut ParameterList, ctx: &mut RunContext, path: &Path) -> EsorexResult<()> {
        if !path.is_file() {
            log::error!("Unable to open configuration file '{}'", path.display());
            return Err(FileError::FileNotFound(path.to_path_buf()).into());
        }
        parse_config_file(list, path, &mut ctx.sources)?;
        list.expand_tilde();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, EsorexError};
    use crate::params::{ParamMode, Parameter};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn caller_list() -> ParameterList {
        [Parameter::new_value("esorex.caller.output-prefix", "esorex.caller", "", "D")
            .with_alias(ParamMode::CommandLine, "output-prefix")
            .with_alias(ParamMode::Environment, "ESOREX_OUTPUT_PREFIX")]
        .into_iter()
        .collect()
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Every combination of global file, local file, environment and
    /// command line: the last enabled source wins.
    #[test]
    fn test_precedence_over_all_combinations() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("global.rc");
        let local = dir.path().join("local.rc");
        fs::write(&global, "esorex.caller.output-prefix=G\n").unwrap();
        fs::write(&local, "esorex.caller.output-prefix=L\n").unwrap();

        for mask in 0u8..16 {
            let use_global = mask & 1 != 0;
            let use_local = mask & 2 != 0;
            let use_env = mask & 4 != 0;
            let use_cli = mask & 8 != 0;

            let mut env = HashMap::new();
            if use_env {
                env.insert("ESOREX_OUTPUT_PREFIX".to_string(), "E".to_string());
            }
            let resolver = ConfigResolver::new().with_env_lookup(move |v| env.get(v).cloned());
            let mut list = caller_list();
            let mut ctx = RunContext::default();
            let argv = if use_cli { args(&["--output-prefix=C", "rec"]) } else { args(&["rec"]) };
            resolver
                .resolve_caller(
                    &mut list,
                    &mut ctx,
                    use_global.then_some(global.as_path()),
                    use_local.then_some(local.as_path()),
                    &argv,
                )
                .unwrap();

            let expected = if use_cli {
                "C"
            } else if use_env {
                "E"
            } else if use_local {
                "L"
            } else if use_global {
                "G"
            } else {
                "D"
            };
            assert_eq!(list.get_string("esorex.caller.output-prefix"), Some(expected), "mask {mask:04b}");
        }
    }

    #[test]
    fn test_missing_local_file_is_fatal() {
        let resolver = ConfigResolver::new().with_env_lookup(|_| None);
        let mut list = caller_list();
        let err = resolver
            .resolve_caller(
                &mut list,
                &mut RunContext::default(),
                None,
                Some(Path::new("/no/such/local.rc")),
                &args(&["rec"]),
            )
            .unwrap_err();
        assert!(matches!(err, EsorexError::File(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_broken_global_file_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("esorex.rc");
        fs::write(&global, "esorex.caller.unknown=1\n").unwrap();
        let resolver = ConfigResolver::new().with_env_lookup(|_| None);
        let mut list = caller_list();
        let pos = resolver
            .resolve_caller(&mut list, &mut RunContext::default(), Some(&global), None, &args(&["rec"]))
            .unwrap();
        assert!(matches!(pos, Positionals::Caller { recipe: Some(ref r), .. } if r == "rec"));
    }

    #[test]
    fn test_recipe_passes() {
        let dir = TempDir::new().unwrap();
        let rc = dir.path().join("rec.rc");
        let explicit = dir.path().join("explicit.rc");
        fs::write(&rc, "rec.a=1\nrec.b=1\n").unwrap();
        fs::write(&explicit, "rec.b=2\n").unwrap();

        let mut list: ParameterList = [
            Parameter::new_value("rec.a", "rec", "", 0),
            Parameter::new_value("rec.b", "rec", "", 0),
            Parameter::new_value("rec.c", "rec", "", 0),
        ]
        .into_iter()
        .collect();
        let resolver = ConfigResolver::new().with_env_lookup(|_| None);
        let sofs = resolver
            .resolve_recipe(
                &mut list,
                &mut RunContext::default(),
                Some(&rc),
                Some(&explicit),
                &args(&["--rec.c=3", "in.sof"]),
            )
            .unwrap();
        assert_eq!(sofs, args(&["in.sof"]));
        assert_eq!(
            (list.get_int("rec.a"), list.get_int("rec.b"), list.get_int("rec.c")),
            (Some(1), Some(2), Some(3))
        );
    }

    #[test]
    fn test_recipe_option_errors_propagate() {
        let mut list: ParameterList = [Parameter::new_value("rec.a", "rec", "", 0)].into_iter().collect();
        let err = ConfigResolver::new()
            .with_env_lookup(|_| None)
            .resolve_recipe(&mut list, &mut RunContext::default(), None, None, &args(&["--rec.z=1"]))
            .unwrap_err();
        assert!(matches!(err, EsorexError::Config(ConfigError::UnknownOption(_))));
    }
}
