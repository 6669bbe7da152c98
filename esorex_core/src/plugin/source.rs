//! Loadable modules providing recipes.

use std::path::Path;

use super::traits::{Recipe, RecipeInfo};
use crate::error::DiscoveryError;

/// Kind of module, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Native,
    Script,
}

/// Extension of native modules on this platform
pub const NATIVE_EXTENSION: &str = std::env::consts::DLL_EXTENSION;

/// Extension of script modules
pub const SCRIPT_EXTENSION: &str = "py";

impl ModuleKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext == NATIVE_EXTENSION => Some(ModuleKind::Native),
            Some(SCRIPT_EXTENSION) if cfg!(feature = "script-recipes") => Some(ModuleKind::Script),
            _ => None,
        }
    }
}

/// An opened module: a shared library or a script file.
///
/// Dropping the source closes the module. Recipes obtained from
/// [`PluginSource::get_plugin`] must be dropped before their source.
pub trait PluginSource {
    fn path(&self) -> &Path;

    fn kind(&self) -> ModuleKind;

    /// Identity of every recipe in the module, in export order
    fn list_plugins(&self) -> Vec<RecipeInfo>;

    /// Take the recipe called `name` out of the module
    fn get_plugin(&mut self, name: &str) -> Option<Box<dyn Recipe>>;
}

/// Opens module files. Replaced in tests by in-process fakes.
pub trait ModuleOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginSource>, DiscoveryError>;

    /// Cheap check that `path` is a usable module
    fn validate(&self, path: &Path) -> Result<(), DiscoveryError> {
        self.open(path).map(drop)
    }
}

/// Opener for real modules on disk
#[derive(Debug, Default, Clone)]
pub struct DefaultOpener {
    #[cfg(feature = "script-recipes")]
    bridge: super::script::ScriptBridge,
}

impl DefaultOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleOpener for DefaultOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginSource>, DiscoveryError> {
        match ModuleKind::from_path(path) {
            Some(ModuleKind::Native) => Ok(Box::new(super::native::NativeModule::open(path)?)),
            #[cfg(feature = "script-recipes")]
            Some(ModuleKind::Script) => Ok(Box::new(super::script::ScriptModule::open(
                path,
                self.bridge.clone(),
            )?)),
            _ => Err(DiscoveryError::ModuleLoadFailed {
                path: path.to_path_buf(),
                reason: "not a recipe module".to_string(),
            }),
        }
    }

    fn validate(&self, path: &Path) -> Result<(), DiscoveryError> {
        match ModuleKind::from_path(path) {
            Some(ModuleKind::Native) => super::native::NativeModule::probe(path),
            _ => self.open(path).map(drop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        let native = format!("libvimos.{NATIVE_EXTENSION}");
        assert_eq!(ModuleKind::from_path(Path::new(&native)), Some(ModuleKind::Native));
        assert_eq!(ModuleKind::from_path(Path::new("README")), None);
        assert_eq!(ModuleKind::from_path(Path::new("notes.txt")), None);
        #[cfg(feature = "script-recipes")]
        assert_eq!(ModuleKind::from_path(Path::new("rec.py")), Some(ModuleKind::Script));
    }

    #[test]
    fn test_default_opener_rejects_other_files() {
        let err = DefaultOpener::new().open(Path::new("/tmp/notes.txt")).err().unwrap();
        assert!(matches!(err, DiscoveryError::ModuleLoadFailed { .. }));
    }
}
