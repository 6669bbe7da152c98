//! # EsoRex Core
//!
//! The recipe execution engine behind the `esorex` program.
//!
//! A *recipe* is a data reduction step shipped in a loadable module: a
//! native library built against this crate, or a Python module run through
//! an external interpreter. This crate provides:
//!
//! - **Parameters**: typed, constrained settings with per-source aliases
//! - **Configuration**: config files, environment and command line passes
//! - **Discovery**: recipe directory scanning and version arbitration
//! - **Execution**: the recipe life cycle with guaranteed cleanup
//! - **Products**: integrity metadata, relocation, archive links, PAF files
//! - **Help**: option listings, man pages and generated config files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esorex_core::{ConfigResolver, DefaultOpener, PluginRunner, RunContext, RunSettings};
//!
//! let mut ctx = RunContext::default();
//! let settings = RunSettings::default();
//! let opener = DefaultOpener::new();
//! let resolver = ConfigResolver::new();
//! let report = PluginRunner::new(&opener, &resolver, &settings).run(
//!     &mut ctx,
//!     "vimos_bias",
//!     &["bias.sof".to_string()],
//!     &mut std::io::stdout(),
//! );
//! std::process::exit(report.exit_code());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod fileutils;
pub mod frames;
pub mod help;
pub mod logging;
pub mod paf;
pub mod params;
pub mod plugin;
pub mod products;
pub mod runner;
pub mod strings;
pub mod terminal;

/// Program name, used as log domain and in generated text
pub const PACKAGE: &str = "esorex";

/// Context of the caller parameters; their names are `esorex.caller.<option>`
pub const PACKAGE_RESOURCE: &str = "esorex.caller";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::{ConfigResolver, Positionals};
pub use context::RunContext;
pub use error::{EsorexError, EsorexResult};
pub use frames::{Frame, FrameGroup, FrameSet};
pub use logging::{MessageLevel, MessengerHandle};
pub use params::{ParamMode, ParamValue, Parameter, ParameterList};
pub use plugin::{DefaultOpener, PluginDescriptor, PluginRegistry, Recipe, RecipeContext, RecipeInfo};
pub use runner::{PluginRunner, RunFailure, RunOutcome, RunReport, RunSettings, RunState};
