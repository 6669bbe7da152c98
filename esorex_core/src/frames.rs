//! Frames and sets of frames (SOF).
//!
//! A SOF file lists one input file per line:
//!
//! ```text
//! # comment
//! /data/raw/bias_1.fits   BIAS        RAW
//! $CALIB/master_bias.fits MASTER_BIAS CALIB
//! ```
//!
//! Fields are separated by blanks; the tag and the group are optional. The
//! group is only applied when all three fields are present and must be
//! `RAW`, `CALIB` or `PRODUCT` (anything else means no group).

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{EsorexResult, FileError};
use crate::fileutils;

/// Tag given to a FITS file passed directly instead of a SOF
pub const COMMAND_LINE_TAG: &str = "COMMAND_LINE";

/// Role of a frame within a recipe run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FrameGroup {
    #[default]
    None,
    Raw,
    Calib,
    Product,
}

impl FrameGroup {
    /// Group named in a SOF line; matching is case sensitive.
    pub fn from_sof(text: &str) -> Self {
        match text {
            "RAW" => FrameGroup::Raw,
            "CALIB" => FrameGroup::Calib,
            "PRODUCT" => FrameGroup::Product,
            _ => FrameGroup::None,
        }
    }

    /// Numeric code used in the script recipe protocol
    pub fn code(self) -> i64 {
        match self {
            FrameGroup::None => 0,
            FrameGroup::Raw => 1,
            FrameGroup::Calib => 2,
            FrameGroup::Product => 3,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => FrameGroup::Raw,
            2 => FrameGroup::Calib,
            3 => FrameGroup::Product,
            _ => FrameGroup::None,
        }
    }
}

impl fmt::Display for FrameGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameGroup::None => "NONE",
            FrameGroup::Raw => "RAW",
            FrameGroup::Calib => "CALIB",
            FrameGroup::Product => "PRODUCT",
        })
    }
}

/// Integrity metadata attached to a product after post-processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Integrity {
    pub data_hash: Option<String>,
    pub checksum: Option<String>,
}

/// One input or output file of a recipe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub filename: String,
    pub tag: String,
    pub group: FrameGroup,
    pub integrity: Option<Integrity>,
}

impl Frame {
    pub fn new(filename: impl Into<String>, tag: impl Into<String>, group: FrameGroup) -> Self {
        Self {
            filename: filename.into(),
            tag: tag.into(),
            group,
            integrity: None,
        }
    }

    /// Product frame, as registered by recipes for their outputs
    pub fn product(filename: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(filename, tag, FrameGroup::Product)
    }

    pub fn is_product(&self) -> bool {
        self.group == FrameGroup::Product
    }
}

/// Ordered collection of frames; tags may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Frame> {
        self.frames.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    pub fn products(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().filter(|f| f.is_product())
    }

    pub fn products_mut(&mut self) -> impl Iterator<Item = &mut Frame> {
        self.frames.iter_mut().filter(|f| f.is_product())
    }

    pub fn raw_frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().filter(|f| f.group == FrameGroup::Raw)
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<&Frame> {
        self.frames.iter().find(|f| f.tag == tag)
    }

    /// Append the frames listed in the SOF file `path`.
    ///
    /// With `check_exist`, every referenced file must exist; all missing
    /// files are reported before the call fails. Otherwise missing files
    /// are only mentioned at debug level.
    pub fn load_sof(&mut self, path: impl AsRef<Path>, check_exist: bool) -> EsorexResult<()> {
        let path = path.as_ref();
        let text = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                log::error!("Unable to open SOF file '{}'", path.display());
                return Err(FileError::from_io(path, e).into());
            }
        };
        self.parse_sof_str(&text, &path.to_string_lossy(), check_exist)
    }

    /// Parse SOF contents; `origin` names the SOF in messages and is used as
    /// the frame name when the contents turn out to be a FITS header.
    pub fn parse_sof_str(&mut self, text: &str, origin: &str, check_exist: bool) -> EsorexResult<()> {
        let mut first_missing: Option<String> = None;

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().take(3).collect();
            let Some(&raw_path) = fields.first() else {
                log::debug!(
                    "Invalid frame description '{}', specified on line {} of the SOF file, '{}'.",
                    line, line_number, origin
                );
                continue;
            };

            let path = if raw_path.starts_with('$') {
                match fileutils::expand_env(raw_path) {
                    Some(expanded) => expanded,
                    None => {
                        log::error!("Expansion of {} failed...", raw_path);
                        return Err(FileError::FileNotFound(raw_path.into()).into());
                    }
                }
            } else {
                raw_path.to_string()
            };

            if !fileutils::file_exists(&path) {
                if path.starts_with("SIMPLE") {
                    // a single FITS file was given instead of a SOF
                    self.push(Frame::new(origin, COMMAND_LINE_TAG, FrameGroup::None));
                    return Ok(());
                }
                let tag_msg = fields
                    .get(1)
                    .map_or_else(|| "no tag".to_string(), |t| format!("tag '{t}'"));
                let group_msg = fields
                    .get(2)
                    .map_or_else(|| "no group".to_string(), |g| format!("group '{g}'"));
                let msg = format!(
                    "Could not open the input file '{}' with {} and {} in line {} of the SOF '{}'",
                    path, tag_msg, group_msg, line_number, origin
                );
                if check_exist {
                    log::error!("{}", msg);
                    first_missing.get_or_insert_with(|| path.clone());
                } else {
                    log::debug!("{}", msg);
                }
            }

            let tag = fields.get(1).copied().unwrap_or("");
            let group = if fields.len() == 3 {
                FrameGroup::from_sof(fields[2])
            } else {
                FrameGroup::None
            };
            self.push(Frame::new(path, tag, group));
        }

        match first_missing {
            Some(missing) => Err(FileError::FileNotFound(missing.into()).into()),
            None => Ok(()),
        }
    }

    /// Text listing of the product frames: `<path>     <tag>` per line.
    pub fn products_text(&self) -> String {
        self.products()
            .map(|f| format!("{}     {}", f.filename, f.tag))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON listing of the product frames
    pub fn products_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Entry<'a> {
            #[serde(skip_serializing_if = "str::is_empty")]
            name: &'a str,
            #[serde(skip_serializing_if = "str::is_empty")]
            category: &'a str,
        }
        let entries: Vec<Entry<'_>> = self
            .products()
            .map(|f| Entry {
                name: &f.filename,
                category: &f.tag,
            })
            .collect();
        serde_json::to_string_pretty(&entries)
    }
}

impl FromIterator<Frame> for FrameSet {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FrameSet {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sof_fields_and_groups() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.fits");
        fs::write(&a, b"x").unwrap();
        let text = format!(
            "# header comment\n\n{a} BIAS RAW\n   {a} FLAT\n{a}\n{a} DARK raw\n{a} MASTER CALIB extra\n",
            a = a.display()
        );

        let mut set = FrameSet::new();
        set.parse_sof_str(&text, "test.sof", true).unwrap();
        let frames: Vec<_> = set.iter().map(|f| (f.tag.as_str(), f.group)).collect();
        assert_eq!(
            frames,
            vec![
                ("BIAS", FrameGroup::Raw),
                ("FLAT", FrameGroup::None),
                ("", FrameGroup::None),
                ("DARK", FrameGroup::None),
                ("MASTER", FrameGroup::Calib),
            ]
        );
    }

    #[test]
    fn test_sof_unknown_group_is_unclassified() {
        let mut set = FrameSet::new();
        set.parse_sof_str("/a/b.fits RAW\n# comment\n\n/c/d.fits CALIB GROUP_X\n", "in.sof", false)
            .unwrap();
        let frames: Vec<_> = set.iter().map(|f| (f.filename.as_str(), f.tag.as_str(), f.group)).collect();
        assert_eq!(
            frames,
            vec![
                ("/a/b.fits", "RAW", FrameGroup::None),
                ("/c/d.fits", "CALIB", FrameGroup::None),
            ]
        );

        let mut set = FrameSet::new();
        set.parse_sof_str("/a/b.fits\n", "in.sof", false).unwrap();
        assert_eq!(set.iter().next().unwrap().tag, "");
    }

    #[test]
    fn test_missing_file_with_check_fails() {
        let mut set = FrameSet::new();
        let err = set
            .parse_sof_str("/does/not/exist.fits RAW_TAG RAW\n", "test.sof", true)
            .unwrap_err();
        assert!(err.to_string().contains("/does/not/exist.fits"));
    }

    #[test]
    fn test_missing_file_without_check_is_kept() {
        let mut set = FrameSet::new();
        set.parse_sof_str("/does/not/exist.fits RAW_TAG RAW\n", "test.sof", false)
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).unwrap().group, FrameGroup::Raw);
    }

    #[test]
    fn test_fits_file_given_as_sof() {
        let mut set = FrameSet::new();
        set.parse_sof_str("SIMPLE  =                    T / conforms", "image.fits", true)
            .unwrap();
        assert_eq!(set.len(), 1);
        let frame = set.get(0).unwrap();
        assert_eq!(frame.filename, "image.fits");
        assert_eq!(frame.tag, COMMAND_LINE_TAG);
    }

    #[test]
    fn test_environment_expansion() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.fits"), b"x").unwrap();
        std::env::set_var("ESOREX_FRAMES_TEST_DIR", tmp.path());
        let mut set = FrameSet::new();
        set.parse_sof_str("$ESOREX_FRAMES_TEST_DIR/b.fits B RAW\n", "t.sof", true)
            .unwrap();
        assert_eq!(
            set.get(0).unwrap().filename,
            format!("{}/b.fits", tmp.path().display())
        );
    }

    #[test]
    fn test_load_sof_unreadable() {
        let mut set = FrameSet::new();
        assert!(set.load_sof("/no/such/file.sof", false).is_err());
    }

    #[test]
    fn test_products_listings() {
        let set: FrameSet = [
            Frame::new("in.fits", "BIAS", FrameGroup::Raw),
            Frame::product("out_0000.fits", "MASTER_BIAS"),
            Frame::product("out_0001.fits", ""),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            set.products_text(),
            "out_0000.fits     MASTER_BIAS\nout_0001.fits     "
        );
        assert_eq!(
            set.products_json().unwrap(),
            "[\n  {\n    \"name\": \"out_0000.fits\",\n    \"category\": \"MASTER_BIAS\"\n  },\n  {\n    \"name\": \"out_0001.fits\"\n  }\n]"
        );
    }
}
