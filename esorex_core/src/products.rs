//! Post-processing of the product frames a recipe registered.
//!
//! After a successful `exec` every product is signed, renamed to
//! `<prefix>_NNNN<suffix>` in the output directory, optionally made
//! read-only and exported into the archive link directory. After a failed
//! `exec` the products are only signed.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{EsorexResult, ProductError};
use crate::fileutils;
use crate::frames::{FrameSet, Integrity};

/// Name given to a product whose computed name turns out empty
const FALLBACK_NAME: &str = "dummy_output";

/// Which integrity metadata to attach to products
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub data_hash: bool,
    pub checksum: bool,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            data_hash: true,
            checksum: true,
        }
    }
}

impl Signature {
    pub fn none() -> Self {
        Self {
            data_hash: false,
            checksum: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.data_hash && !self.checksum
    }
}

/// Ones' complement sum of the file taken as big-endian 32-bit words,
/// zero padded to a whole word.
fn ones_complement_add(sum: u32, word: u32) -> u32 {
    let (total, carry) = sum.overflowing_add(word);
    total.wrapping_add(carry as u32)
}

/// Compute the integrity metadata of the file at `path`.
pub fn compute_integrity(path: impl AsRef<Path>, signature: Signature) -> Result<Integrity, ProductError> {
    let path = path.as_ref();
    let fail = |e: io::Error| ProductError::ChecksumFailed {
        file: path.display().to_string(),
        reason: e.to_string(),
    };

    let mut file = File::open(path).map_err(fail)?;
    let mut hasher = Sha256::new();
    let mut sum = 0u32;
    let mut pending: Vec<u8> = Vec::with_capacity(4);
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).map_err(fail)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        if signature.data_hash {
            hasher.update(chunk);
        }
        if signature.checksum {
            for &byte in chunk {
                pending.push(byte);
                if pending.len() == 4 {
                    let word = u32::from_be_bytes([pending[0], pending[1], pending[2], pending[3]]);
                    sum = ones_complement_add(sum, word);
                    pending.clear();
                }
            }
        }
    }
    if signature.checksum && !pending.is_empty() {
        pending.resize(4, 0);
        let word = u32::from_be_bytes([pending[0], pending[1], pending[2], pending[3]]);
        sum = ones_complement_add(sum, word);
    }

    Ok(Integrity {
        data_hash: signature.data_hash.then(|| format!("{:x}", hasher.finalize())),
        checksum: signature.checksum.then(|| format!("{:08x}", sum)),
    })
}

/// Attach integrity metadata to every product. Files that cannot be read
/// are reported and left unsigned. Returns the number of signed products.
pub fn sign_products(frames: &mut FrameSet, signature: Signature) -> usize {
    if signature.is_empty() {
        return 0;
    }
    let mut signed = 0;
    for frame in frames.products_mut() {
        match compute_integrity(&frame.filename, signature) {
            Ok(integrity) => {
                log::debug!(
                    "Product '{}': data hash {}, checksum {}",
                    frame.filename,
                    integrity.data_hash.as_deref().unwrap_or("-"),
                    integrity.checksum.as_deref().unwrap_or("-")
                );
                frame.integrity = Some(integrity);
                signed += 1;
            }
            Err(e) => {
                log::error!("could not update the product header ({})", e);
            }
        }
    }
    signed
}

/// Output options for [`relocate_products`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub output_dir: String,
    pub prefix: String,
    pub link_dir: String,
    pub suppress_prefix: bool,
    pub suppress_link: bool,
    pub read_only: bool,
    pub signature: Signature,
}

impl Default for Relocation {
    fn default() -> Self {
        Self {
            output_dir: ".".to_string(),
            prefix: "out".to_string(),
            link_dir: "/tmp".to_string(),
            suppress_prefix: false,
            suppress_link: true,
            read_only: false,
            signature: Signature::default(),
        }
    }
}

/// Final name of the product `filename`, the `index`-th one of the run
fn product_name(filename: &str, index: usize, settings: &Relocation) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = if settings.suppress_prefix {
        base
    } else {
        let suffix = base.rfind('.').map_or("", |i| &base[i..]);
        format!("{}_{:04}{}", settings.prefix, index, suffix)
    };
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

fn report(count: usize) {
    log::info!("{} product{} created", count, if count == 1 { "" } else { "s" });
}

/// Sign, rename, link and protect the products of a successful run.
///
/// Frames are processed in order and renamed frames get their new path.
/// The first failure stops the loop; products handled before it keep
/// their new location. Returns the number of products created.
pub fn relocate_products(frames: &mut FrameSet, settings: &Relocation) -> Result<usize, ProductError> {
    let dir_error = |dir: &str| ProductError::RelocationFailed {
        target: dir.to_string(),
        reason: "cannot get directory status information".to_string(),
    };

    let output_dir = fileutils::tilde_replace(&settings.output_dir);
    let output_dir = fileutils::dot_replace(&output_dir).map_err(|_| dir_error(&output_dir))?;
    let link_dir = fileutils::tilde_replace(&settings.link_dir);

    let cwd = std::env::current_dir().map_err(|_| dir_error("."))?;
    if !fileutils::directory_exists(&output_dir) {
        log::error!("cannot get directory status information for '{}'", output_dir);
        return Err(dir_error(&output_dir));
    }
    let target_is_cwd = fileutils::same_file(&cwd, &output_dir);

    if frames.products().next().is_some() && !settings.signature.is_empty() {
        log::info!("Calculating product checksums");
    }
    sign_products(frames, settings.signature);

    let mut created = 0;
    for frame in frames.products_mut() {
        if frame.filename.is_empty() {
            report(created);
            return Err(ProductError::RelocationFailed {
                target: String::new(),
                reason: "product frame without file name".to_string(),
            });
        }

        let name = product_name(&frame.filename, created, settings);
        let final_path: PathBuf = if target_is_cwd && frame.filename == name {
            log::info!("Created product {} (in place)", name);
            PathBuf::from(&name)
        } else {
            let target = Path::new(&output_dir).join(&name);
            log::debug!("moving {} to {}", frame.filename, target.display());
            if let Err(e) = fileutils::move_file(&frame.filename, &target) {
                log::error!("Unable to move product file to final output path ({})", target.display());
                report(created);
                return Err(ProductError::RelocationFailed {
                    target: target.display().to_string(),
                    reason: e.to_string(),
                });
            }
            frame.filename = target.display().to_string();
            log::info!("Created product {}", frame.filename);
            target
        };

        if !settings.suppress_link {
            if let Err(e) = fileutils::link_into(&link_dir, &final_path) {
                log::error!(
                    "Unable to create symbolic link for {} in directory {}",
                    final_path.display(),
                    link_dir
                );
                report(created);
                return Err(ProductError::LinkFailed {
                    file: final_path.display().to_string(),
                    dir: link_dir,
                    reason: e.to_string(),
                });
            }
        }

        if settings.read_only {
            if let Err(e) = fileutils::set_read_only(&final_path) {
                log::warn!("Could not make {} read-only: {}", final_path.display(), e);
            }
        }
        created += 1;
    }

    report(created);
    Ok(created)
}

/// Write the product frames as a SOF: JSON when `path` ends in `.json`,
/// text otherwise.
pub fn write_products_sof(frames: &FrameSet, path: impl AsRef<Path>) -> EsorexResult<()> {
    let path = path.as_ref();
    let is_json = path.extension().is_some_and(|e| e == "json");
    let mut contents = if is_json {
        frames.products_json()?
    } else {
        frames.products_text()
    };
    if !contents.is_empty() {
        contents.push('\n');
    }
    std::fs::write(path, contents).map_err(|e| crate::error::EsorexError::file(path, e))?;
    Ok(())
}
