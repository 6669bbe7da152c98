//! Running one recipe: lookup, init, configuration, execution, product
//! handling, deinit and cleanup.
//!
//! ```text
//! Resolving -> Initialized -> Configured -> Executing -> PostProcessing
//!     |             |              |             |              |
//!     +-- Aborted   +--------------+-------------+--------------+--> Deinitialized -> Done
//! ```
//!
//! `deinit` runs exactly once whenever `init` was attempted. Unloading the
//! module and moving the scratch log into place happen in a [`Drop`] guard,
//! so they run on every exit path of [`PluginRunner::run`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::Level;
use thiserror::Error;

use crate::config::ConfigResolver;
use crate::context::RunContext;
use crate::error::{DiscoveryError, EsorexError, LifecycleError, ProductError};
use crate::fileutils;
use crate::frames::FrameSet;
use crate::help::{self, ConfigTarget, RC_DIR, RC_EXTENSION};
use crate::logging::{MessageLevel, MessengerHandle};
use crate::paf;
use crate::params::{ParameterList, SOURCE_RECIPE_DEFAULT};
use crate::plugin::{ModuleOpener, PluginDescriptor, PluginDirectoryScanner, PluginRegistry, RecipeContext};
use crate::products::{self, Relocation, Signature};
use crate::strings::split_list;
use crate::terminal::term_width;
use crate::{PACKAGE, PACKAGE_RESOURCE, VERSION};

/// Name of the log file written while the run is in progress
pub const SCRATCH_LOG: &str = ".logfile";

pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_NOT_FOUND: i32 = 3;
pub const EXIT_FRAME_LOAD: i32 = 4;
pub const EXIT_RELOCATION: i32 = 61;
pub const EXIT_LINK: i32 = 62;
pub const EXIT_PAF: i32 = 63;
pub const EXIT_OUTPUT: i32 = 64;

fn caller_key(option: &str) -> String {
    format!("{PACKAGE_RESOURCE}.{option}")
}

/// Caller options that drive a recipe run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub recipe_dirs: Vec<String>,
    pub recipe_config: Option<PathBuf>,
    /// Base of `~/.esorex`; without it per-recipe files are not read
    pub home: Option<PathBuf>,
    pub check_sof_exist: bool,
    pub create_config: Option<ConfigTarget>,
    pub man_page: bool,
    pub help: bool,
    pub params: bool,
    pub show_hidden: bool,
    pub unload_plugin: bool,
    pub time: bool,
    pub relocation: Relocation,
    pub paf_config: Option<PathBuf>,
    pub products_sof: Option<PathBuf>,
    pub log_dir: String,
    pub log_file: String,
    pub term_width: usize,
    /// Arguments of the program, recorded in the log file
    pub command_line: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            recipe_dirs: vec![".".to_string()],
            recipe_config: None,
            home: None,
            check_sof_exist: false,
            create_config: None,
            man_page: false,
            help: false,
            params: false,
            show_hidden: false,
            unload_plugin: true,
            time: false,
            relocation: Relocation::default(),
            paf_config: None,
            products_sof: None,
            log_dir: ".".to_string(),
            log_file: format!("{PACKAGE}.log"),
            term_width: crate::terminal::DEFAULT_TERM_WIDTH,
            command_line: String::new(),
        }
    }
}

impl RunSettings {
    /// Read the settings from a resolved caller parameter list. Options
    /// missing from the list keep their default.
    pub fn from_caller(list: &ParameterList) -> Self {
        let defaults = Self::default();
        let text = |option: &str| {
            list.get_string(&caller_key(option))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let flag = |option: &str, default: bool| list.get_bool(&caller_key(option)).unwrap_or(default);

        let create_config = list
            .find(&caller_key("create-config"))
            .filter(|p| p.is_explicit())
            .and_then(|p| p.value().as_str().and_then(ConfigTarget::from_option));

        let signature = Signature {
            data_hash: !flag("no-datamd5", false),
            checksum: !flag("no-checksum", false),
        };

        let base = &defaults.relocation;
        let relocation = Relocation {
            output_dir: text("output-dir").unwrap_or_else(|| base.output_dir.clone()),
            prefix: list
                .get_string(&caller_key("output-prefix"))
                .map_or_else(|| base.prefix.clone(), str::to_string),
            link_dir: text("link-dir").unwrap_or_else(|| base.link_dir.clone()),
            suppress_prefix: flag("suppress-prefix", base.suppress_prefix),
            suppress_link: flag("suppress-link", base.suppress_link),
            read_only: flag("output-readonly", base.read_only),
            signature,
        };

        Self {
            recipe_dirs: text("recipe-dir")
                .map(|dirs| split_list(&dirs, ':').into_vec())
                .unwrap_or(defaults.recipe_dirs),
            recipe_config: text("recipe-config").map(PathBuf::from),
            home: dirs::home_dir(),
            check_sof_exist: flag("check-sof-exist", defaults.check_sof_exist),
            create_config,
            man_page: flag("man-page", false),
            help: flag("help", false),
            params: flag("params", false),
            show_hidden: flag("show-hidden", false),
            unload_plugin: flag("unload-plugin", defaults.unload_plugin),
            time: flag("time", false),
            relocation,
            paf_config: text("paf-config").map(PathBuf::from),
            products_sof: text("products-sof").map(PathBuf::from),
            log_dir: text("log-dir").unwrap_or(defaults.log_dir),
            log_file: text("log-file").unwrap_or(defaults.log_file),
            term_width: term_width(),
            command_line: String::new(),
        }
    }

    pub fn with_command_line(mut self, args: &[String]) -> Self {
        self.command_line = args.join(" ");
        self
    }

    fn recipe_rc(&self, recipe: &str) -> Option<PathBuf> {
        self.home
            .as_ref()
            .map(|home| home.join(RC_DIR).join(format!("{recipe}{RC_EXTENSION}")))
    }

    fn log_target(&self) -> (PathBuf, PathBuf) {
        let dir = PathBuf::from(fileutils::tilde_replace(&self.log_dir));
        (dir.join(SCRATCH_LOG), dir.join(&self.log_file))
    }
}

/// Furthest point a run reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Resolving,
    Initialized,
    Configured,
    Executing,
    PostProcessing,
    Deinitialized,
    Done,
    Aborted,
}

/// Why a run failed
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error(transparent)]
    NotFound(DiscoveryError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Config(EsorexError),

    #[error("Problem occurred loading frameset from the SOF file '{sof}'")]
    FrameLoad { sof: String },

    #[error(transparent)]
    Product(#[from] ProductError),

    /// Side outputs: configuration files, the products SOF, help text
    #[error(transparent)]
    Output(EsorexError),
}

impl RunFailure {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunFailure::NotFound(_) => EXIT_NOT_FOUND,
            RunFailure::Lifecycle(
                LifecycleError::InitFailed { code, .. }
                | LifecycleError::ExecFailed { code, .. }
                | LifecycleError::DeinitFailed { code, .. },
            ) => *code,
            RunFailure::Config(_) => EXIT_CONFIG,
            RunFailure::FrameLoad { .. } => EXIT_FRAME_LOAD,
            RunFailure::Product(ProductError::LinkFailed { .. }) => EXIT_LINK,
            RunFailure::Product(ProductError::PafWriteFailed { .. }) => EXIT_PAF,
            RunFailure::Product(_) => EXIT_RELOCATION,
            RunFailure::Output(_) => EXIT_OUTPUT,
        }
    }
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Executed,
    /// Help, man page, parameter listing or config file creation
    Informational,
}

/// Result of [`PluginRunner::run`] together with the recipe data
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub result: Result<RunOutcome, RunFailure>,
    pub parameters: ParameterList,
    pub frames: FrameSet,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match &self.result {
            Ok(_) => 0,
            Err(failure) => failure.exit_code(),
        }
    }
}

/// Unloads the module and moves the scratch log into place when dropped
struct CleanupFunnel {
    messenger: MessengerHandle,
    descriptor: Option<PluginDescriptor>,
    unload: bool,
    log_target: Option<PathBuf>,
}

impl Drop for CleanupFunnel {
    fn drop(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            if self.unload {
                log::debug!("Unloading {}", descriptor.library_path().display());
                drop(descriptor);
            } else {
                log::warn!("unloading of plugins is inhibited by program option 'unload-plugin'!");
                descriptor.keep_resident();
            }
        }

        let Some(scratch) = self.messenger.close_log_file() else {
            return;
        };
        let Some(target) = self.log_target.take() else {
            return;
        };
        if let Err(e) = fs::copy(&scratch, &target) {
            log::warn!("Could not copy {} to {}: {}", scratch.display(), target.display(), e);
        } else if let Err(e) = fs::remove_file(&scratch) {
            log::debug!("Could not remove {}: {}", scratch.display(), e);
        }
    }
}

/// Drives one recipe through its life cycle
pub struct PluginRunner<'a> {
    opener: &'a dyn ModuleOpener,
    resolver: &'a ConfigResolver,
    settings: &'a RunSettings,
}

impl<'a> PluginRunner<'a> {
    pub fn new(opener: &'a dyn ModuleOpener, resolver: &'a ConfigResolver, settings: &'a RunSettings) -> Self {
        Self {
            opener,
            resolver,
            settings,
        }
    }

    /// Run `recipe` with the arguments that followed it on the command
    /// line. Informational text goes to `out`.
    pub fn run(&self, ctx: &mut RunContext, recipe: &str, recipe_args: &[String], out: &mut dyn Write) -> RunReport {
        let started = Instant::now();
        let mut funnel = CleanupFunnel {
            messenger: ctx.messenger.clone(),
            descriptor: None,
            unload: self.settings.unload_plugin,
            log_target: None,
        };
        self.open_log(ctx, &mut funnel);

        let mut report = RunReport {
            state: RunState::Resolving,
            result: Ok(RunOutcome::Executed),
            parameters: ParameterList::new(),
            frames: FrameSet::new(),
            elapsed: Duration::ZERO,
        };

        let scanner = PluginDirectoryScanner::new(self.opener);
        let candidates = scanner.candidates(&self.settings.recipe_dirs);
        let registry = PluginRegistry::new(self.opener, &self.settings.recipe_dirs.join(":"));
        let plugin = match registry.find(&candidates, recipe) {
            Ok(descriptor) => funnel.descriptor.insert(descriptor),
            Err(e) => {
                log::error!("{}", e);
                report.state = RunState::Aborted;
                report.result = Err(RunFailure::NotFound(e));
                return report;
            }
        };

        let mut rctx = RecipeContext::new(ctx.messenger.clone());
        let name = plugin.name().to_string();
        let mut raw_frames = FrameSet::new();

        let result = self.drive(plugin, &mut rctx, ctx, recipe_args, out, &mut report.state, &mut raw_frames);

        report.state = RunState::Deinitialized;
        let code = {
            let _domain = ctx.domain_guard(&name);
            plugin.deinit(&mut rctx)
        };
        report.result = match result {
            Ok(RunOutcome::Executed) if code != 0 => {
                let err = LifecycleError::DeinitFailed { recipe: name, code };
                log::error!("{}", err);
                Err(err.into())
            }
            other => other,
        };

        report.elapsed = started.elapsed();
        if self.settings.time {
            time_report(report.elapsed, &raw_frames);
        }

        report.state = match report.result {
            Err(_) => RunState::Aborted,
            Ok(_) => RunState::Done,
        };
        report.parameters = rctx.parameters;
        report.frames = rctx.frames;
        report
    }

    fn open_log(&self, ctx: &RunContext, funnel: &mut CleanupFunnel) {
        let (scratch, target) = self.settings.log_target();
        if let Err(e) = ctx.messenger.open_log_file(&scratch) {
            log::warn!("EsoRex is unable to establish the message log ({})", e);
            return;
        }
        funnel.log_target = Some(target);
        ctx.messenger
            .file_only(Level::Info, format_args!("This is EsoRex, version {VERSION}"));
        ctx.messenger.file_only(
            Level::Info,
            format_args!("Invocation command line was: {}", self.settings.command_line),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn drive(
        &self,
        plugin: &mut PluginDescriptor,
        rctx: &mut RecipeContext,
        ctx: &mut RunContext,
        recipe_args: &[String],
        out: &mut dyn Write,
        state: &mut RunState,
        raw_frames: &mut FrameSet,
    ) -> Result<RunOutcome, RunFailure> {
        let name = plugin.name().to_string();

        *state = RunState::Initialized;
        let code = {
            let _domain = ctx.domain_guard(&name);
            plugin.init(rctx)
        };
        if code != 0 {
            log::error!("Init of recipe failed...");
            return Err(LifecycleError::InitFailed { recipe: name, code }.into());
        }
        for param in rctx.parameters.iter() {
            ctx.sources.record(param.name(), SOURCE_RECIPE_DEFAULT);
        }

        let rc = self.settings.recipe_rc(&name);
        let sofs = self
            .resolver
            .resolve_recipe(
                &mut rctx.parameters,
                ctx,
                rc.as_deref(),
                self.settings.recipe_config.as_deref(),
                recipe_args,
            )
            .map_err(RunFailure::Config)?;
        let loaded = self.load_frames(&mut rctx.frames, &sofs);
        *raw_frames = rctx.frames.raw_frames().cloned().collect();
        *state = RunState::Configured;

        if self.informational(plugin, rctx, ctx, out)? {
            loaded?;
            return Ok(RunOutcome::Informational);
        }
        loaded?;

        *state = RunState::Executing;
        let signature = self.settings.relocation.signature;
        let code = {
            let _domain = ctx.domain_guard(&name);
            plugin.exec(rctx)
        };
        if code != 0 {
            let err = LifecycleError::ExecFailed { recipe: name.clone(), code };
            log::error!("{}", err);
            products::sign_products(&mut rctx.frames, signature);
            return self
                .write_outputs(&rctx.frames, &name, Err(err.into()))
                .map(|_| RunOutcome::Executed);
        }

        *state = RunState::PostProcessing;
        let moved = products::relocate_products(&mut rctx.frames, &self.settings.relocation)
            .map(drop)
            .map_err(|e| {
                log::error!("An error occurred while trying to move the output products");
                RunFailure::from(e)
            });
        self.write_outputs(&rctx.frames, &name, moved)
            .map(|_| RunOutcome::Executed)
    }

    fn load_frames(&self, frames: &mut FrameSet, sofs: &[String]) -> Result<(), RunFailure> {
        let mut result = Ok(());
        for sof in sofs {
            if frames.load_sof(sof, self.settings.check_sof_exist).is_err() {
                log::error!(
                    "Problem occurred loading frameset from the SOF file '{}'.\n\
                     If you want to ignore errors of missing files in the sof, set '--check-sof-exist=false'.",
                    sof
                );
                if result.is_ok() {
                    result = Err(RunFailure::FrameLoad { sof: sof.clone() });
                }
            }
        }
        result
    }

    /// Side actions replacing execution. Returns true when one ran.
    fn informational(
        &self,
        plugin: &PluginDescriptor,
        rctx: &RecipeContext,
        ctx: &RunContext,
        out: &mut dyn Write,
    ) -> Result<bool, RunFailure> {
        let settings = self.settings;
        let width = settings.term_width;
        let debug = ctx.messenger.terminal_level() == MessageLevel::Debug;
        let mut shown = false;

        if let Some(target) = &settings.create_config {
            let home = settings.home.clone().unwrap_or_default();
            help::create_config(target, plugin.name(), &home, &rctx.parameters, Some(plugin.name()))
                .map_err(RunFailure::Output)?;
            shown = true;
        }

        let mut text = String::new();
        if settings.man_page {
            text.push_str(&help::man_page(plugin.info(), &rctx.parameters, settings.show_hidden, width));
            shown = true;
        }
        if settings.help {
            let library = debug.then(|| plugin.library_path());
            text.push_str(&help::recipe_help(
                plugin.info(),
                &rctx.parameters,
                library,
                settings.show_hidden,
                width,
            ));
            shown = true;
        } else if settings.params {
            let sources = debug.then_some(&ctx.sources);
            text.push_str(&help::params_listing(&rctx.parameters, "Recipe Parameters", sources, width));
            shown = true;
        }

        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| RunFailure::Output(e.into()))?;
        Ok(shown)
    }

    /// PAF files and the products SOF, skipped with a warning after an
    /// earlier failure
    fn write_outputs(&self, frames: &FrameSet, recipe: &str, mut status: Result<(), RunFailure>) -> Result<(), RunFailure> {
        if let Some(config) = &self.settings.paf_config {
            if status.is_ok() {
                let output_dir = fileutils::tilde_replace(&self.settings.relocation.output_dir);
                if let Err(e) = paf::write_recipe_pafs(frames, recipe, config, Path::new(&output_dir)) {
                    log::error!("Cannot create paf files: {}", e);
                    status = Err(e.into());
                }
            } else {
                log::warn!("Writing of paf files omitted due to previous errors");
            }
        }

        if let Some(sof) = &self.settings.products_sof {
            if status.is_ok() {
                if let Err(e) = products::write_products_sof(frames, sof) {
                    log::error!("Cannot create output sof file: {}", e);
                    status = Err(RunFailure::Output(e));
                }
            } else {
                log::warn!("Writing of output sof omitted due to previous errors");
            }
        }
        status
    }
}

fn time_report(elapsed: Duration, raw_frames: &FrameSet) {
    let seconds = elapsed.as_secs_f64();
    let mut bytes = 0u64;
    let mut count = 0;
    for frame in raw_frames.iter() {
        match fs::metadata(&frame.filename) {
            Ok(meta) => {
                bytes += meta.len();
                count += 1;
            }
            Err(_) => log::warn!("could not get size of {}", frame.filename),
        }
    }

    if seconds > 0.0 {
        log::info!("Recipe operation(s) took {:14.3} seconds to complete.", seconds);
    }
    if bytes > 0 {
        let megabytes = bytes as f64 * 0.000_001;
        if count > 1 {
            log::info!("Total size of {} raw input frames  = {:8.2} MB", count, megabytes);
        } else {
            log::info!("Size of single raw input frame  = {:8.2} MB", megabytes);
        }
        if seconds > 0.0 {
            log::info!("=> processing rate of {:8.2} MB/sec", megabytes / seconds);
        }
    }
}
