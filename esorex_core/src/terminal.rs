//! Terminal utilities for EsoRex.
//!
//! Help output and option listings are wrapped at the width of the
//! terminal attached to stdout. When stdout is not a tty (pipes, files,
//! test harnesses) the classic 80 column layout is used.

/// Width used when the terminal cannot be queried
pub const DEFAULT_TERM_WIDTH: usize = 80;

/// Current width of the terminal attached to stdout.
pub fn term_width() -> usize {
    query_width().unwrap_or(DEFAULT_TERM_WIDTH)
}

#[cfg(unix)]
fn query_width() -> Option<usize> {
    use std::os::unix::io::AsRawFd;

    if !std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        return None;
    }

    // SAFETY: stdout fd is valid; winsize is a zeroed C struct that
    // TIOCGWINSZ fills in
    unsafe {
        let fd = std::io::stdout().as_raw_fd();
        let mut size: libc::winsize = std::mem::zeroed();
        if libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) != 0 {
            return None;
        }
        (size.ws_col > 0).then_some(size.ws_col as usize)
    }
}

#[cfg(not(unix))]
fn query_width() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_width_is_positive() {
        assert!(term_width() > 0);
    }
}
