//! Recipe contract shared by the engine and recipe libraries.
//!
//! A native recipe library is a `cdylib` built against this crate. It
//! exports one entry point that appends its recipes to a [`RecipeList`]:
//!
//! ```rust,ignore
//! use esorex_core::plugin::{Recipe, RecipeContext, RecipeInfo};
//!
//! pub struct Bias;
//!
//! impl Recipe for Bias {
//!     fn info(&self) -> RecipeInfo {
//!         RecipeInfo::new("vimos_bias", 30201).with_synopsis("Master bias")
//!     }
//!
//!     fn init(&mut self, ctx: &mut RecipeContext) -> i32 {
//!         ctx.parameters.push(Parameter::new_value("vimos.bias.clip", "vimos.bias", "Clip", true));
//!         0
//!     }
//!
//!     fn exec(&mut self, ctx: &mut RecipeContext) -> i32 {
//!         ctx.frames.push(Frame::product("master_bias.fits", "MASTER_BIAS"));
//!         0
//!     }
//! }
//!
//! esorex_core::export_recipes!(Bias);
//! ```
//!
//! Trait objects cross the library boundary, so a recipe library must be
//! built with the same compiler and the same version of this crate as the
//! program loading it.

use serde::{Deserialize, Serialize};

use crate::frames::FrameSet;
use crate::logging::MessengerHandle;
use crate::params::ParameterList;

/// Descriptive identity of a recipe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeInfo {
    pub name: String,
    pub synopsis: String,
    pub description: String,
    pub author: String,
    pub email: String,
    pub copyright: String,
    /// Higher versions win when several libraries provide the same recipe
    pub version: u64,
}

impl RecipeInfo {
    pub fn new(name: &str, version: u64) -> Self {
        Self {
            name: name.to_string(),
            version,
            ..Default::default()
        }
    }

    pub fn with_synopsis(mut self, synopsis: &str) -> Self {
        self.synopsis = synopsis.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_author(mut self, author: &str, email: &str) -> Self {
        self.author = author.to_string();
        self.email = email.to_string();
        self
    }

    pub fn with_copyright(mut self, copyright: &str) -> Self {
        self.copyright = copyright.to_string();
        self
    }

    /// Version number split into `major.minor.micro`
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            self.version / 10000,
            (self.version / 100) % 100,
            self.version % 100
        )
    }
}

/// Data a recipe owns during a run
#[derive(Debug, Default)]
pub struct RecipeContext {
    /// Registered by `init`, resolved by the engine before `exec`
    pub parameters: ParameterList,
    /// Inputs loaded from the SOFs; `exec` appends its products
    pub frames: FrameSet,
    pub messenger: MessengerHandle,
}

impl RecipeContext {
    pub fn new(messenger: MessengerHandle) -> Self {
        Self {
            parameters: ParameterList::new(),
            frames: FrameSet::new(),
            messenger,
        }
    }
}

/// A data reduction recipe.
///
/// Every callback returns `0` on success; any other value is an error code
/// that is only reported.
pub trait Recipe {
    fn info(&self) -> RecipeInfo;

    /// Register the recipe parameters
    fn init(&mut self, ctx: &mut RecipeContext) -> i32;

    /// Process the input frames
    fn exec(&mut self, ctx: &mut RecipeContext) -> i32;

    fn deinit(&mut self, _ctx: &mut RecipeContext) -> i32 {
        0
    }
}

/// Container filled by a library entry point
#[derive(Default)]
pub struct RecipeList {
    recipes: Vec<Box<dyn Recipe>>,
}

impl RecipeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, recipe: Box<dyn Recipe>) {
        self.recipes.push(recipe);
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn into_vec(self) -> Vec<Box<dyn Recipe>> {
        self.recipes
    }
}

/// Signature of the library entry point
#[allow(improper_ctypes_definitions)]
pub type RecipeEntryFn = unsafe extern "C" fn(&mut RecipeList) -> i32;

/// Name of the entry point symbol every recipe library exports
pub const RECIPE_ENTRY_SYMBOL: &str = "esorex_get_recipe_info";

/// Export the entry point of a recipe library.
///
/// ```rust,ignore
/// esorex_core::export_recipes!(Bias, Dark::default());
/// ```
#[macro_export]
macro_rules! export_recipes {
    ($($recipe:expr),+ $(,)?) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn esorex_get_recipe_info(list: &mut $crate::plugin::RecipeList) -> i32 {
            $( list.push(Box::new($recipe)); )+
            0
        }
    };
}
