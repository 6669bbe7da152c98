//! Quick-look parameter files (PAF) for products.
//!
//! A PAF configuration lists blocks introduced by `PRO CATG=<regex>`,
//! each followed by one keyword regex per line:
//!
//! ```text
//! # bias products
//! PRO CATG=^MASTER_BIAS$
//! ESO DET CHIP1 ID
//! ESO DET OUT. .*
//! ```
//!
//! For every FITS product whose `ESO PRO CATG` matches a block, the
//! mandatory keywords, `ARCFILE`, the requested keywords and every `ESO QC`
//! keyword of the primary header are written to `qc_NNNN.paf`.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use regex::Regex;

use crate::error::ProductError;
use crate::fileutils;
use crate::frames::{FrameGroup, FrameSet};

const MANDATORY_KEYS: &str = "PRO CATG|INSTRUME|MJD-OBS|ESO TPL ID|DATE-OBS|ESO OBS ID";
const QC_KEYS: &str = "ESO QC";
const PRO_CATG_KEY: &str = "ESO PRO CATG";
const ANCESTOR_KEY: &str = "ESO PRO ANCESTOR";

const CARD_LEN: usize = 80;
const BLOCK_LEN: usize = 2880;
/// Upper bound on the primary header size that is read
const MAX_HEADER_BLOCKS: usize = 1000;

/// One `PRO CATG` block of a PAF configuration
#[derive(Debug, Clone)]
pub struct PafRule {
    pub pro_catg: Regex,
    pub keywords: Vec<Regex>,
}

/// Parsed PAF configuration file
#[derive(Debug, Clone, Default)]
pub struct PafConfig {
    rules: Vec<PafRule>,
}

fn config_error(origin: &str, reason: impl Into<String>) -> ProductError {
    ProductError::PafWriteFailed {
        file: origin.to_string(),
        reason: reason.into(),
    }
}

fn compile(origin: &str, pattern: &str) -> Result<Regex, ProductError> {
    Regex::new(pattern).map_err(|e| config_error(origin, format!("bad regular expression '{pattern}': {e}")))
}

impl PafConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProductError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| config_error(&origin, e.to_string()))?;
        Self::parse_str(&text, &origin)
    }

    pub fn parse_str(text: &str, origin: &str) -> Result<Self, ProductError> {
        let mut rules: Vec<PafRule> = Vec::new();

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with("PRO CATG") {
                let pattern = line
                    .split_once('=')
                    .map(|(_, p)| p.trim())
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| config_error(origin, "Parse error in PAF config. No '=' delimiter"))?;
                rules.push(PafRule {
                    pro_catg: compile(origin, pattern)?,
                    keywords: Vec::new(),
                });
                continue;
            }
            match rules.last_mut() {
                Some(rule) => rule.keywords.push(compile(origin, line)?),
                None => return Err(config_error(origin, "Error parsing PAF configuration file")),
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[PafRule] {
        &self.rules
    }

    /// First rule whose category regex matches `pro_catg`
    pub fn matching(&self, pro_catg: &str) -> Option<&PafRule> {
        self.rules.iter().find(|r| r.pro_catg.is_match(pro_catg))
    }
}

/// A keyword of a FITS header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCard {
    pub key: String,
    pub value: String,
    /// The value was a quoted string
    pub text: bool,
}

fn parse_card(card: &str) -> Option<HeaderCard> {
    let (key, rest) = if let Some(hierarch) = card.strip_prefix("HIERARCH ") {
        let (key, rest) = hierarch.split_once('=')?;
        (key.trim().to_string(), rest)
    } else {
        if card.get(8..10) != Some("= ") {
            return None;
        }
        (card[..8].trim().to_string(), &card[10..])
    };

    let rest = rest.trim_start();
    if let Some(quoted) = rest.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                    continue;
                }
                break;
            }
            value.push(c);
        }
        Some(HeaderCard {
            key,
            value: value.trim_end().to_string(),
            text: true,
        })
    } else {
        let value = rest.split('/').next().unwrap_or("").trim().to_string();
        Some(HeaderCard { key, value, text: false })
    }
}

/// Read the keyword cards of the primary header of a FITS file.
pub fn read_primary_header(path: impl AsRef<Path>) -> io::Result<Vec<HeaderCard>> {
    let mut file = fs::File::open(path)?;
    let mut cards = Vec::new();
    let mut block = vec![0u8; BLOCK_LEN];

    for _ in 0..MAX_HEADER_BLOCKS {
        file.read_exact(&mut block)?;
        for raw in block.chunks(CARD_LEN) {
            let card = String::from_utf8_lossy(raw);
            if card.trim_end() == "END" {
                return Ok(cards);
            }
            if let Some(parsed) = parse_card(&card) {
                cards.push(parsed);
            }
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "no END card in primary header"))
}

fn header_value<'a>(cards: &'a [HeaderCard], key: &str) -> Option<&'a str> {
    cards.iter().find(|c| c.key == key).map(|c| c.value.as_str())
}

/// `ARCFILE` of the first raw frame, or the ancestor it names
fn raw_arcfile(frames: &FrameSet) -> Result<String, String> {
    let raw = frames
        .iter()
        .find(|f| f.group == FrameGroup::Raw)
        .ok_or_else(|| "There are no RAW frames".to_string())?;
    let cards = read_primary_header(&raw.filename)
        .map_err(|e| format!("Could not read the main header of {}: {}", raw.filename, e))?;

    header_value(&cards, ANCESTOR_KEY)
        .or_else(|| header_value(&cards, PRO_CATG_KEY).map_or_else(|| header_value(&cards, "ARCFILE"), |_| None))
        .map(str::to_string)
        .ok_or_else(|| format!("Could not get ARCFILE information from the main header of {}", raw.filename))
}

/// `ESO QC BIAS MEAN` becomes `QC.BIAS.MEAN`
fn paf_key(key: &str) -> String {
    key.strip_prefix("ESO ").unwrap_or(key).split_whitespace().collect::<Vec<_>>().join(".")
}

fn add_unique(card: &HeaderCard, selected: &mut Vec<HeaderCard>) {
    if !selected.iter().any(|c| c.key == card.key) {
        selected.push(card.clone());
    }
}

/// Keywords selected for one product, in output order
fn select_cards(cards: &[HeaderCard], rule: &PafRule, arcfile: &str) -> Vec<HeaderCard> {
    let mut selected: Vec<HeaderCard> = Vec::new();

    let mandatory = Regex::new(MANDATORY_KEYS).ok();
    for card in cards.iter().filter(|c| mandatory.as_ref().is_some_and(|r| r.is_match(&c.key))) {
        add_unique(card, &mut selected);
    }
    add_unique(
        &HeaderCard {
            key: "ARCFILE".into(),
            value: arcfile.into(),
            text: true,
        },
        &mut selected,
    );
    for pattern in &rule.keywords {
        let before = selected.len();
        for card in cards.iter().filter(|c| pattern.is_match(&c.key)) {
            add_unique(card, &mut selected);
        }
        if selected.len() == before {
            log::debug!("Cannot find keywords matching {}", pattern);
        }
    }
    for card in cards.iter().filter(|c| c.key.contains(QC_KEYS)) {
        add_unique(card, &mut selected);
    }
    selected
}

fn paf_line(out: &mut String, key: &str, value: String) {
    out.push_str(&format!("{:<30}{} ;\n", key, value));
}

fn render_paf(file_name: &str, instrument: &str, recipe: &str, cards: &[HeaderCard]) -> String {
    let now = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    let mut out = String::new();

    paf_line(&mut out, "PAF.HDR.START", String::new());
    paf_line(&mut out, "PAF.TYPE", "\"pipeline product\"".into());
    paf_line(&mut out, "PAF.ID", "\"\"".into());
    paf_line(&mut out, "PAF.NAME", format!("\"{file_name}\""));
    paf_line(&mut out, "PAF.DESC", "\"QC1 parameters\"".into());
    paf_line(&mut out, "PAF.CRTE.NAME", format!("\"{instrument}\""));
    paf_line(&mut out, "PAF.CRTE.DAYTIM", format!("\"{now}\""));
    paf_line(&mut out, "PAF.LCHG.NAME", "\"KNOWN\"".into());
    paf_line(&mut out, "PAF.LCHG.DAYTIM", format!("\"{now}\""));
    paf_line(&mut out, "PAF.CHCK.CHECKSUM", "\"\"".into());
    paf_line(&mut out, "PAF.HDR.END", String::new());
    out.push('\n');
    paf_line(&mut out, "PRO.REC1.ID", format!("\"{recipe}\""));
    for card in cards {
        let value = if card.text {
            format!("\"{}\"", card.value)
        } else {
            card.value.clone()
        };
        paf_line(&mut out, &paf_key(&card.key), value);
    }
    out
}

/// Write the PAF files of all matching FITS products into `output_dir`.
/// Returns the number of files written.
pub fn write_recipe_pafs(
    frames: &FrameSet,
    recipe: &str,
    config_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<usize, ProductError> {
    log::info!("Creating PAF files");
    let config = PafConfig::load(config_path).map_err(|e| {
        log::error!("Could not parse the PAF configuration file");
        e
    })?;

    let mut index = 0;
    let mut written = 0;
    for frame in frames.products() {
        if !fileutils::is_fits(&frame.filename) {
            log::debug!("File is not a FITS product {}", frame.filename);
            continue;
        }
        let fail = |reason: String| {
            log::error!("{}", reason);
            ProductError::PafWriteFailed {
                file: frame.filename.clone(),
                reason,
            }
        };

        let cards = read_primary_header(&frame.filename)
            .map_err(|e| fail(format!("Could not read the main header of {}: {}", frame.filename, e)))?;
        let pro_catg = header_value(&cards, PRO_CATG_KEY)
            .ok_or_else(|| fail(format!("Could not get PRO CATG in file {}", frame.filename)))?;
        index += 1;
        log::debug!("Product with PRO CATG={}", pro_catg);

        let Some(rule) = config.matching(pro_catg) else {
            continue;
        };
        log::debug!("Matched with regexp ={}", rule.pro_catg);

        let arcfile = match header_value(&cards, ANCESTOR_KEY) {
            Some(ancestor) => ancestor.to_string(),
            None => raw_arcfile(frames).map_err(&fail)?,
        };

        let selected = select_cards(&cards, rule, &arcfile);
        let name = format!("qc_{:04}.paf", index);
        let target = output_dir.as_ref().join(&name);
        let instrument = header_value(&cards, "INSTRUME").unwrap_or("");
        fs::write(&target, render_paf(&name, instrument, recipe, &selected)).map_err(|e| {
            log::error!("Could not write {}", target.display());
            ProductError::PafWriteFailed {
                file: target.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Frame;
    use tempfile::TempDir;

    fn fits_with(cards: &[&str]) -> Vec<u8> {
        let mut header = String::from("SIMPLE  =                    T / conforms to FITS");
        header = format!("{header:<80}");
        for card in cards {
            header.push_str(&format!("{card:<80}"));
        }
        header.push_str(&format!("{:<80}", "END"));
        let mut bytes = header.into_bytes();
        let padded = bytes.len().div_ceil(BLOCK_LEN) * BLOCK_LEN;
        bytes.resize(padded, b' ');
        bytes
    }

    #[test]
    fn test_config_blocks() {
        let config = PafConfig::parse_str(
            "# comment\nPRO CATG=^MASTER_BIAS$\nESO DET CHIP1 ID\n\nPRO CATG = FLAT\nESO INS FILT. NAME\n",
            "qc.cfg",
        )
        .unwrap();
        assert_eq!(config.rules().len(), 2);
        assert_eq!(config.rules()[0].keywords.len(), 1);
        assert!(config.matching("MASTER_BIAS").is_some());
        assert!(config.matching("MASTER_BIAS_2").is_none());
        assert_eq!(config.matching("MASTER_FLAT").unwrap().pro_catg.as_str(), "FLAT");
    }

    #[test]
    fn test_config_errors() {
        assert!(PafConfig::parse_str("ESO QC\n", "qc.cfg").is_err());
        assert!(PafConfig::parse_str("PRO CATG\n", "qc.cfg").is_err());
        assert!(PafConfig::parse_str("PRO CATG=(\n", "qc.cfg").is_err());
    }

    #[test]
    fn test_card_parsing() {
        let card = parse_card("HIERARCH ESO QC BIAS MEAN = 212.5 / [ADU] mean").unwrap();
        assert_eq!(card.key, "ESO QC BIAS MEAN");
        assert_eq!(card.value, "212.5");
        assert!(!card.text);

        let card = parse_card("INSTRUME= 'VIMOS   '           / instrument").unwrap();
        assert_eq!((card.key.as_str(), card.value.as_str(), card.text), ("INSTRUME", "VIMOS", true));

        let card = parse_card("OBJECT  = 'it''s'").unwrap();
        assert_eq!(card.value, "it's");

        assert!(parse_card("COMMENT just words").is_none());
    }

    #[test]
    fn test_paf_written_for_matching_product() {
        let tmp = TempDir::new().unwrap();
        let product = tmp.path().join("out_0000.fits");
        fs::write(
            &product,
            fits_with(&[
                "INSTRUME= 'VIMOS'",
                "HIERARCH ESO PRO CATG = 'MASTER_BIAS'",
                "HIERARCH ESO PRO ANCESTOR = 'VIMOS.2018-01-01T00:00:00.000.fits'",
                "HIERARCH ESO DET CHIP1 ID = 'CCD-44'",
                "HIERARCH ESO QC BIAS MEAN = 212.5",
            ]),
        )
        .unwrap();
        let other = tmp.path().join("out_0001.fits");
        fs::write(&other, fits_with(&["HIERARCH ESO PRO CATG = 'STATS'"])).unwrap();
        let config = tmp.path().join("qc.cfg");
        fs::write(&config, "PRO CATG=^MASTER_BIAS$\nESO DET CHIP1 ID\n").unwrap();

        let frames: FrameSet = [
            Frame::product(product.display().to_string(), "MASTER_BIAS"),
            Frame::product(other.display().to_string(), "STATS"),
        ]
        .into_iter()
        .collect();

        let written = write_recipe_pafs(&frames, "vimos_bias", &config, tmp.path()).unwrap();
        assert_eq!(written, 1);
        let paf = fs::read_to_string(tmp.path().join("qc_0001.paf")).unwrap();
        assert!(paf.contains("PRO.REC1.ID"));
        assert!(paf.contains("\"vimos_bias\""));
        assert!(paf.contains("DET.CHIP1.ID"));
        let qc = paf.lines().find(|l| l.starts_with("QC.BIAS.MEAN")).unwrap();
        assert!(qc.ends_with(" 212.5 ;"), "{qc}");
        assert!(paf.contains("\"VIMOS.2018-01-01T00:00:00.000.fits\""));
        assert!(!tmp.path().join("qc_0002.paf").exists());
    }

    #[test]
    fn test_product_without_category_fails() {
        let tmp = TempDir::new().unwrap();
        let product = tmp.path().join("p.fits");
        fs::write(&product, fits_with(&["INSTRUME= 'VIMOS'"])).unwrap();
        let config = tmp.path().join("qc.cfg");
        fs::write(&config, "PRO CATG=.*\n").unwrap();
        let frames: FrameSet = [Frame::product(product.display().to_string(), "X")].into_iter().collect();
        let err = write_recipe_pafs(&frames, "r", &config, tmp.path()).unwrap_err();
        assert!(err.to_string().contains("PRO CATG"));
    }
}
