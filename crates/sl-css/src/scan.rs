/// Tracks string and bracket nesting while walking CSS source byte by byte.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct NestingState {
    quote: Option<u8>,
    escape: bool,
    paren_depth: u32,
    bracket_depth: u32,
}

impl NestingState {
    /// Feeds one byte. Returns `true` when the byte sits at top level,
    /// outside strings, parentheses and attribute brackets.
    pub(crate) fn advance(&mut self, byte: u8) -> bool {
        if let Some(quote) = self.quote {
            if self.escape {
                self.escape = false;
            } else if byte == b'\\' {
                self.escape = true;
            } else if byte == quote {
                self.quote = None;
            }
            return false;
        }

        match byte {
            b'\'' | b'"' => {
                self.quote = Some(byte);
                false
            }
            b'(' => {
                self.paren_depth = self.paren_depth.saturating_add(1);
                false
            }
            b')' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                false
            }
            b'[' => {
                self.bracket_depth = self.bracket_depth.saturating_add(1);
                false
            }
            b']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                false
            }
            _ => self.paren_depth == 0 && self.bracket_depth == 0,
        }
    }

    pub(crate) fn in_string(&self) -> bool {
        self.quote.is_some()
    }
}

pub(crate) fn find_top_level(input: &str, from: usize, target: u8) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut state = NestingState::default();
    let mut idx = from;
    while idx < bytes.len() {
        if state.advance(bytes[idx]) && bytes[idx] == target {
            return Some(idx);
        }
        idx = idx.saturating_add(1);
    }
    None
}

pub(crate) fn find_matching_brace(input: &str, open_brace: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(open_brace).copied() != Some(b'{') {
        return None;
    }

    let mut state = NestingState::default();
    let mut depth = 1_u32;
    let mut idx = open_brace.saturating_add(1);
    while idx < bytes.len() {
        let byte = bytes[idx];
        state.advance(byte);
        if !state.in_string() {
            match byte {
                b'{' => depth = depth.saturating_add(1),
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                _ => {}
            }
        }
        idx = idx.saturating_add(1);
    }
    None
}

pub(crate) fn split_top_level(input: &str, delimiter: u8) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut state = NestingState::default();
    let mut parts = Vec::new();
    let mut start = 0_usize;
    for (idx, byte) in bytes.iter().enumerate() {
        if state.advance(*byte) && *byte == delimiter {
            parts.push(&input[start..idx]);
            start = idx.saturating_add(1);
        }
    }
    parts.push(&input[start..]);
    parts
}

pub(crate) fn strip_comments(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut state = NestingState::default();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0_usize;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if !state.in_string() && byte == b'/' && bytes.get(idx.saturating_add(1)) == Some(&b'*') {
            idx = match input[idx.saturating_add(2)..].find("*/") {
                Some(end) => idx.saturating_add(2).saturating_add(end).saturating_add(2),
                None => bytes.len(),
            };
            continue;
        }
        state.advance(byte);
        out.push(byte);
        idx = idx.saturating_add(1);
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub(crate) fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace runs outside string literals.
pub(crate) fn normalize_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = NestingState::default();
    let mut last_was_space = false;
    for ch in input.chars() {
        let mut buf = [0_u8; 4];
        let first = ch.encode_utf8(&mut buf).as_bytes()[0];
        let was_in_string = state.in_string();
        state.advance(first);

        if !was_in_string && ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        out.push(ch);
    }
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::find_top_level;
    use super::split_top_level;
    use super::strip_comments;

    #[test]
    fn ignores_delimiters_inside_strings_and_functions() {
        let parts = split_top_level("a:url(x;y);b:'c;d';e:f", b';');
        assert_eq!(parts, vec!["a:url(x;y)", "b:'c;d'", "e:f"]);
    }

    #[test]
    fn finds_top_level_brace_after_attribute_selector() {
        assert_eq!(find_top_level("a[title='{']{x}", 0, b'{'), Some(12));
    }

    #[test]
    fn keeps_comment_markers_inside_strings() {
        assert_eq!(
            strip_comments("/* gone */a{content:'/* kept */'}"),
            "a{content:'/* kept */'}"
        );
    }
}
