//! File system helpers: path shorthand expansion, moving products and
//! creating archive links.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Replace a leading `~` with the home directory, collapse repeated
/// slashes and drop a trailing slash. Other paths are returned unchanged.
pub fn tilde_replace(name: &str) -> String {
    let Some(rest) = name.strip_prefix('~') else {
        return name.to_string();
    };
    let Some(home) = dirs::home_dir() else {
        log::warn!("Could not find the home directory, '~' in '{}' is not replaced", name);
        return name.to_string();
    };

    let mut expanded = format!("{}/{}", home.display(), rest);
    while expanded.contains("//") {
        expanded = expanded.replace("//", "/");
    }
    if expanded.len() > 1 && expanded.ends_with('/') {
        expanded.pop();
    }
    expanded
}

/// Replace a leading `.` (or `..`) with the current working directory.
pub fn dot_replace(name: &str) -> io::Result<String> {
    if !name.starts_with('.') {
        return Ok(name.to_string());
    }
    let cwd = std::env::current_dir()?;
    let cwd = cwd.display();
    if name.starts_with("..") {
        Ok(format!("{cwd}/.{}", &name[1..]))
    } else {
        Ok(format!("{cwd}{}", &name[1..]))
    }
}

/// Expand `$VAR` and `${VAR}` references in `text`.
///
/// Returns `None` when a referenced variable is not defined, in which case
/// the caller keeps the original text.
pub fn expand_env(text: &str) -> Option<String> {
    expand_env_with(text, |name| std::env::var(name).ok())
}

/// [`expand_env`] with an injectable variable lookup
pub fn expand_env_with(text: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let name = match chars.peek() {
            Some(&(_, '{')) => {
                let start = i + 2;
                let end = text[start..].find('}')? + start;
                while let Some(&(j, _)) = chars.peek() {
                    chars.next();
                    if j == end {
                        break;
                    }
                }
                &text[start..end]
            }
            _ => {
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        end = j + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                &text[start..end]
            }
        };
        if name.is_empty() {
            out.push('$');
            continue;
        }
        out.push_str(&lookup(name)?);
    }
    Some(out)
}

pub fn directory_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_dir()
}

pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

/// True when both paths name the same file system object (device and inode).
pub fn same_file(a: impl AsRef<Path>, b: impl AsRef<Path>) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => same_inode(&ma, &mb),
        _ => false,
    }
}

#[cfg(unix)]
fn same_inode(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_inode(_a: &fs::Metadata, _b: &fs::Metadata) -> bool {
    false
}

/// Move `src` to `dst`, copying across file systems. Moving a file onto
/// itself is a no-op.
pub fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> io::Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if same_file(src, dst) {
        return Ok(());
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) => {
            log::debug!("rename {:?} -> {:?} failed ({}), copying instead", src, dst, err);
            if let Err(err) = fs::copy(src, dst) {
                let _ = fs::remove_file(dst);
                return Err(err);
            }
            fs::remove_file(src)
        }
    }
}

/// Export `file` into `link_dir` under its own base name, preferably as a
/// symbolic link. An existing symbolic link of that name is replaced; any
/// other existing file makes the call fail.
pub fn link_into(link_dir: impl AsRef<Path>, file: impl AsRef<Path>) -> io::Result<PathBuf> {
    let file = file.as_ref();
    fs::File::open(file).map_err(|e| {
        io::Error::new(e.kind(), format!("Product file is unreadable: {}", file.display()))
    })?;

    let base = file.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("no file name in {}", file.display()))
    })?;
    let link = link_dir.as_ref().join(base);

    match fs::symlink_metadata(&link) {
        Ok(meta) => {
            log::warn!("the link {} already exists - will be overwritten!", link.display());
            if meta.file_type().is_symlink() {
                fs::remove_file(&link)?;
            } else {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("Not a symbolic link: {}", link.display()),
                ));
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(io::Error::new(
                e.kind(),
                format!("Cannot get file status: {}", link.display()),
            ))
        }
    }

    make_link(file, &link)?;
    Ok(link)
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    fs::copy(target, link).map(|_| ())
}

/// Make `path` read-only for user, group and other (mode 0444).
pub fn set_read_only(path: impl AsRef<Path>) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o444))
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(path, perms)
    }
}

/// Size of a file in bytes, zero if it cannot be inspected.
pub fn file_size(path: impl AsRef<Path>) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// True when the file starts with a FITS primary header card.
pub fn is_fits(path: impl AsRef<Path>) -> bool {
    let mut head = [0u8; 9];
    match fs::File::open(path).and_then(|mut f| f.read_exact(&mut head)) {
        Ok(()) => &head == b"SIMPLE  =",
        Err(_) => false,
    }
}
