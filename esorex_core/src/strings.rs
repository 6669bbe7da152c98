//! String helpers: growable string lists, help text layout and the
//! canonical rendering of double values.

/// Column at which option descriptions start in listings
pub const COMMENT_TAB_POSITION: usize = 24;

/// Prefix of long command line options
pub const COMMAND_LINE_PREFIX: &str = "--";

/// Ordered list of owned strings (recipe file names, SOF paths, directories)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList {
    items: Vec<String>,
}

impl StringList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: impl Into<String>) {
        self.items.push(item.into());
    }

    /// Append `item` unless an equal string is already present.
    /// Returns true when the item was inserted.
    pub fn push_unique(&mut self, item: impl Into<String>) -> bool {
        let item = item.into();
        if self.contains(&item) {
            false
        } else {
            self.items.push(item);
            true
        }
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|s| s == item)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    /// Join all items with `sep`
    pub fn join(&self, sep: &str) -> String {
        self.items.join(sep)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

impl<S: Into<String>> FromIterator<S> for StringList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoIterator for StringList {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Split `text` at every `sep`, dropping empty segments and surrounding blanks.
pub fn split_list(text: &str, sep: char) -> StringList {
    text.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Render a double as the shortest decimal string that parses back to the
/// same value. Integral values keep a trailing `.0`.
pub fn format_double(value: f64) -> String {
    format!("{value:?}")
}

/// Locale independent double parsing; surrounding whitespace is accepted.
pub fn parse_double(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// Insert `indent` blanks after every newline of `text`.
pub fn indent(text: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    text.replace('\n', &format!("\n{pad}"))
}

/// Word-wrap `text` to `width` columns. Continuation lines start with
/// `blanks` spaces; the first line starts at column zero. Words are never
/// split, so a single word longer than the line is kept whole. Newlines
/// already in the text are preserved.
pub fn wrap(text: &str, blanks: usize, width: usize) -> String {
    fill(text, 0, blanks, width)
}

/// Word-wrap `text` assuming the first line already has `first_column`
/// characters in front of it.
pub fn fill(text: &str, first_column: usize, blanks: usize, width: usize) -> String {
    let pad = " ".repeat(blanks);
    let mut out = String::with_capacity(text.len() + 16);
    let mut column = first_column;

    for (n, paragraph) in text.split('\n').enumerate() {
        if n > 0 {
            out.push('\n');
            out.push_str(&pad);
            column = blanks;
        }
        let mut fresh_line = true;
        for word in paragraph.split_whitespace() {
            if !fresh_line && column + 1 + word.len() > width {
                out.push('\n');
                out.push_str(&pad);
                column = blanks;
                fresh_line = true;
            }
            if !fresh_line {
                out.push(' ');
                column += 1;
            }
            out.push_str(word);
            column += word.len();
            fresh_line = false;
        }
    }
    out
}

/// Lay out one entry of an option listing:
///
/// ```text
///   --key                 : description wrapped at the tab position,
///                           continuation lines aligned.
/// ```
pub fn key_description(prefix: &str, key: &str, description: &str, width: usize) -> String {
    let mut line = format!("  {prefix}{key}");
    let mut tab = COMMENT_TAB_POSITION;
    if tab < line.len() {
        tab = line.len() + 2;
    }
    while line.len() < tab {
        line.push(' ');
    }
    line.push_str(": ");
    let column = tab + 2;
    line.push_str(&fill(description, column, column, width));
    line
}

/// Auxiliary line printed below an option description, aligned with it.
pub fn aux_info(prefix: &str, key: &str, info: &str, width: usize) -> String {
    let head_len = 2 + prefix.len() + key.len();
    let mut tab = COMMENT_TAB_POSITION;
    if tab < head_len {
        tab = head_len + 2;
    }
    let column = tab + 2;
    let body = format!("(source = {info})");
    format!("{}{}", " ".repeat(column), fill(&body, column, column, width))
}
