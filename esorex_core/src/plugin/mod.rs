//! Recipe modules: discovery, loading and the recipe contract.
//!
//! - [`traits`]: the [`Recipe`] trait and the library entry point
//! - [`source`]: the [`PluginSource`] abstraction over loadable modules
//! - [`native`]: shared libraries
//! - `script`: Python modules (feature `script-recipes`)
//! - [`scanner`]: recipe directory walking
//! - [`registry`]: version arbitration and instantiation

pub mod native;
pub mod registry;
pub mod scanner;
#[cfg(feature = "script-recipes")]
pub mod script;
pub mod source;
pub mod traits;

pub use native::NativeModule;
pub use registry::{PluginDescriptor, PluginRegistry, Resolution};
pub use scanner::{PluginDirectoryScanner, ScanResult};
#[cfg(feature = "script-recipes")]
pub use script::{ScriptBridge, ScriptModule, ScriptRecipe};
pub use source::{DefaultOpener, ModuleKind, ModuleOpener, PluginSource, NATIVE_EXTENSION, SCRIPT_EXTENSION};
pub use traits::{Recipe, RecipeContext, RecipeEntryFn, RecipeInfo, RecipeList, RECIPE_ENTRY_SYMBOL};
