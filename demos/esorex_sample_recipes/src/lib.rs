//! Sample recipe library.
//!
//! Build it and point `esorex` at the target directory:
//!
//! ```text
//! cargo build -p esorex_sample_recipes
//! esorex --recipe-dir=target/debug --recipes
//! esorex --recipe-dir=target/debug sample_stack --method=first input.sof
//! ```
//!
//! Messages go through the messenger in the recipe context: the `log`
//! facade inside a `cdylib` is a separate instance from the one the
//! program installed its logger on.

use std::fs;
use std::io::Write;

use esorex_core::plugin::{Recipe, RecipeContext, RecipeInfo};
use esorex_core::{Frame, ParamMode, Parameter};

const AUTHOR: &str = "EsoRex Developers";
const EMAIL: &str = "cpl-help@eso.org";
const COPYRIGHT: &str = "GPL-2.0-or-later";

/// Joins the RAW input files into a single product
#[derive(Debug, Default)]
pub struct Stack;

impl Stack {
    const NAME: &'static str = "sample_stack";
    const CONTEXT: &'static str = "sample.stack";
}

impl Recipe for Stack {
    fn info(&self) -> RecipeInfo {
        RecipeInfo::new(Self::NAME, 10000)
            .with_synopsis("Stack the raw input frames")
            .with_description(
                "Writes the raw input files one after the other into the product STACKED. \
                 With method 'first' only the first raw frame is used.",
            )
            .with_author(AUTHOR, EMAIL)
            .with_copyright(COPYRIGHT)
    }

    fn init(&mut self, ctx: &mut RecipeContext) -> i32 {
        ctx.parameters.push(
            Parameter::new_enum(
                "sample.stack.method",
                Self::CONTEXT,
                "How the raw frames are combined",
                "concat",
                ["concat", "first"],
            )
            .with_alias(ParamMode::CommandLine, "method")
            .with_alias(ParamMode::Environment, "SAMPLE_STACK_METHOD"),
        );
        ctx.parameters.push(
            Parameter::new_value(
                "sample.stack.product",
                Self::CONTEXT,
                "File name of the product",
                "sample_stack.fits",
            )
            .with_alias(ParamMode::CommandLine, "product"),
        );
        0
    }

    fn exec(&mut self, ctx: &mut RecipeContext) -> i32 {
        let method = ctx.parameters.get_string("sample.stack.method").unwrap_or("concat");
        let product = ctx
            .parameters
            .get_string("sample.stack.product")
            .unwrap_or("sample_stack.fits")
            .to_string();

        let raws: Vec<String> = ctx.frames.raw_frames().map(|f| f.filename.clone()).collect();
        if raws.is_empty() {
            ctx.messenger.error("No RAW frames in the input set of frames");
            return 1;
        }
        let used = if method == "first" { &raws[..1] } else { &raws[..] };

        let mut out = match fs::File::create(&product) {
            Ok(file) => file,
            Err(e) => {
                ctx.messenger.error(format!("Cannot create {product}: {e}"));
                return 2;
            }
        };
        for raw in used {
            let copied = fs::read(raw).and_then(|data| out.write_all(&data));
            if let Err(e) = copied {
                ctx.messenger.error(format!("Cannot stack {raw}: {e}"));
                return 2;
            }
        }

        ctx.messenger.info(format!("Stacked {} of {} raw frames", used.len(), raws.len()));
        ctx.frames.push(Frame::product(product, "STACKED"));
        0
    }
}

/// Counts the input frames per tag and writes the counts as a product
#[derive(Debug, Default)]
pub struct Census;

impl Census {
    const NAME: &'static str = "sample_census";
    const CONTEXT: &'static str = "sample.census";
}

impl Recipe for Census {
    fn info(&self) -> RecipeInfo {
        RecipeInfo::new(Self::NAME, 10000)
            .with_synopsis("Count the input frames per tag")
            .with_description("Lists every tag of the input set of frames with the number of frames carrying it.")
            .with_author(AUTHOR, EMAIL)
            .with_copyright(COPYRIGHT)
    }

    fn init(&mut self, ctx: &mut RecipeContext) -> i32 {
        ctx.parameters.push(
            Parameter::new_range(
                "sample.census.min-frames",
                Self::CONTEXT,
                "Minimum number of input frames",
                1,
                0,
                1000,
            )
            .with_alias(ParamMode::CommandLine, "min-frames"),
        );
        ctx.parameters.push(
            Parameter::new_value(
                "sample.census.product",
                Self::CONTEXT,
                "File name of the product",
                "sample_census.txt",
            )
            .with_alias(ParamMode::CommandLine, "product"),
        );
        0
    }

    fn exec(&mut self, ctx: &mut RecipeContext) -> i32 {
        let min = ctx.parameters.get_int("sample.census.min-frames").unwrap_or(1);
        let product = ctx
            .parameters
            .get_string("sample.census.product")
            .unwrap_or("sample_census.txt")
            .to_string();

        let total = ctx.frames.len();
        if total < usize::try_from(min).unwrap_or(0) {
            ctx.messenger
                .error(format!("Only {total} input frames, at least {min} required"));
            return 1;
        }

        let mut counts: Vec<(String, usize)> = Vec::new();
        for frame in ctx.frames.iter() {
            match counts.iter_mut().find(|(tag, _)| *tag == frame.tag) {
                Some((_, n)) => *n += 1,
                None => counts.push((frame.tag.clone(), 1)),
            }
        }
        let text: String = counts.iter().map(|(tag, n)| format!("{tag} {n}\n")).collect();
        if let Err(e) = fs::write(&product, text) {
            ctx.messenger.error(format!("Cannot write {product}: {e}"));
            return 2;
        }

        ctx.frames.push(Frame::product(product, "CENSUS"));
        0
    }
}

esorex_core::export_recipes!(Stack, Census);

#[cfg(test)]
mod tests {
    use super::*;
    use esorex_core::params::SourceAnnotations;
    use esorex_core::FrameGroup;
    use tempfile::TempDir;

    fn set(ctx: &mut RecipeContext, name: &str, value: &str) {
        let mut sources = SourceAnnotations::new();
        ctx.parameters
            .find_mut(name)
            .unwrap()
            .set_from_string(Some(value), "test", &mut sources)
            .unwrap();
    }

    fn raw(dir: &TempDir, name: &str, data: &str) -> Frame {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        Frame::new(path.display().to_string(), "BIAS", FrameGroup::Raw)
    }

    #[test]
    fn test_entry_point_lists_both_recipes() {
        let mut list = esorex_core::plugin::RecipeList::new();
        assert_eq!(esorex_get_recipe_info(&mut list), 0);
        let names: Vec<String> = list.into_vec().iter().map(|r| r.info().name).collect();
        assert_eq!(names, ["sample_stack", "sample_census"]);
    }

    #[test]
    fn test_stack_concatenates_raw_frames() {
        let dir = TempDir::new().unwrap();
        let mut ctx = RecipeContext::default();
        let mut recipe = Stack;
        assert_eq!(recipe.init(&mut ctx), 0);

        let product = dir.path().join("stack.fits");
        set(&mut ctx, "sample.stack.product", &product.display().to_string());
        ctx.frames.push(raw(&dir, "a.fits", "aa"));
        ctx.frames.push(raw(&dir, "b.fits", "bb"));

        assert_eq!(recipe.exec(&mut ctx), 0);
        assert_eq!(fs::read_to_string(&product).unwrap(), "aabb");
        assert_eq!(ctx.frames.products().next().unwrap().tag, "STACKED");
    }

    #[test]
    fn test_stack_first_only() {
        let dir = TempDir::new().unwrap();
        let mut ctx = RecipeContext::default();
        let mut recipe = Stack;
        recipe.init(&mut ctx);

        let product = dir.path().join("stack.fits");
        set(&mut ctx, "sample.stack.product", &product.display().to_string());
        set(&mut ctx, "sample.stack.method", "first");
        ctx.frames.push(raw(&dir, "a.fits", "aa"));
        ctx.frames.push(raw(&dir, "b.fits", "bb"));

        assert_eq!(recipe.exec(&mut ctx), 0);
        assert_eq!(fs::read_to_string(&product).unwrap(), "aa");
    }

    #[test]
    fn test_stack_without_raw_frames_fails() {
        let mut ctx = RecipeContext::default();
        let mut recipe = Stack;
        recipe.init(&mut ctx);
        assert_eq!(recipe.exec(&mut ctx), 1);
        assert_eq!(ctx.frames.products().count(), 0);
    }

    #[test]
    fn test_census_counts_tags() {
        let dir = TempDir::new().unwrap();
        let mut ctx = RecipeContext::default();
        let mut recipe = Census;
        recipe.init(&mut ctx);

        let product = dir.path().join("census.txt");
        set(&mut ctx, "sample.census.product", &product.display().to_string());
        ctx.frames.push(raw(&dir, "a.fits", ""));
        ctx.frames.push(raw(&dir, "b.fits", ""));
        ctx.frames.push(Frame::new("flat.fits", "FLAT", FrameGroup::Calib));

        assert_eq!(recipe.exec(&mut ctx), 0);
        assert_eq!(fs::read_to_string(&product).unwrap(), "BIAS 2\nFLAT 1\n");
    }

    #[test]
    fn test_census_minimum() {
        let mut ctx = RecipeContext::default();
        let mut recipe = Census;
        recipe.init(&mut ctx);
        set(&mut ctx, "sample.census.min-frames", "3");
        assert_eq!(recipe.exec(&mut ctx), 1);

        let mut sources = SourceAnnotations::new();
        let out_of_range = ctx
            .parameters
            .find_mut("sample.census.min-frames")
            .unwrap()
            .set_from_string(Some("5000"), "test", &mut sources);
        assert!(out_of_range.is_err());
    }
}
