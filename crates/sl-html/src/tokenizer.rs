use crate::entities::decode_entities;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
    /// Contents of `script`/`style`; never entity-decoded.
    RawText(String),
    Comment(String),
}

pub(crate) fn tokenize(source: &str) -> Vec<Token> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();
    while !scanner.at_end() {
        scanner.step(&mut tokens);
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextMode {
    Raw,
    Escapable,
}

impl TextMode {
    fn for_tag(tag: &str) -> Option<Self> {
        match tag {
            "script" | "style" => Some(Self::Raw),
            "title" | "textarea" => Some(Self::Escapable),
            _ => None,
        }
    }
}

/// Byte cursor over the source. Every position it stops at sits on an ASCII
/// delimiter, so slices between stops are always valid `str` ranges.
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or("")
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        self.src.get(from..to).unwrap_or("")
    }

    fn looking_at(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn bump_while(&mut self, keep: impl Fn(u8) -> bool) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        start
    }

    fn skip_whitespace(&mut self) {
        self.bump_while(|b| b.is_ascii_whitespace());
    }

    fn step(&mut self, tokens: &mut Vec<Token>) {
        if self.looking_at("<!--") {
            tokens.push(Token::Comment(self.comment()));
            return;
        }
        if self.looking_at("</") {
            let mark = self.pos;
            if let Some(name) = self.end_tag() {
                tokens.push(Token::End { name });
                return;
            }
            self.pos = mark;
        } else if self.looking_at("<!") || self.looking_at("<?") {
            self.skip_declaration();
            return;
        } else if self.looking_at("<") {
            let mark = self.pos;
            if let Some(start) = self.start_tag() {
                let raw = match &start {
                    Token::Start {
                        name,
                        self_closing: false,
                        ..
                    } => TextMode::for_tag(name).map(|mode| (name.clone(), mode)),
                    _ => None,
                };
                tokens.push(start);
                if let Some((name, mode)) = raw {
                    let body = self.raw_body(&name);
                    if !body.is_empty() {
                        tokens.push(match mode {
                            TextMode::Raw => Token::RawText(body.to_owned()),
                            TextMode::Escapable => Token::Text(decode_entities(body)),
                        });
                    }
                    tokens.push(Token::End { name });
                }
                return;
            }
            self.pos = mark;
        }

        let text = self.text_run();
        if !text.is_empty() {
            tokens.push(Token::Text(decode_entities(text)));
        }
    }

    fn comment(&mut self) -> String {
        let body = self.pos + 4;
        match self.src.get(body..).and_then(|rest| rest.find("-->")) {
            Some(len) => {
                self.pos = body + len + 3;
                self.slice(body, body + len).to_owned()
            }
            None => {
                self.pos = self.src.len();
                self.src.get(body..).unwrap_or("").to_owned()
            }
        }
    }

    fn skip_declaration(&mut self) {
        self.pos += 2;
        self.bump_while(|b| b != b'>');
        if !self.at_end() {
            self.pos += 1;
        }
    }

    /// Plain text up to the next `<`. A `<` at the cursor that failed to open
    /// a tag is taken literally.
    fn text_run(&mut self) -> &'a str {
        let start = self.pos;
        self.pos += 1;
        self.bump_while(|b| b != b'<');
        self.slice(start, self.pos)
    }

    /// Body of a raw-text element up to its case-insensitive closing tag,
    /// which is consumed. An unclosed element swallows the rest of the input.
    fn raw_body(&mut self, tag: &str) -> &'a str {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut at = start;
        while let Some(offset) = bytes.get(at..).and_then(|rest| rest.iter().position(|b| *b == b'<')) {
            let open = at + offset;
            let name_end = open + 2 + tag.len();
            let closes = bytes.get(open + 1) == Some(&b'/')
                && bytes
                    .get(open + 2..name_end)
                    .is_some_and(|name| name.eq_ignore_ascii_case(tag.as_bytes()));
            if closes {
                let mut gt = name_end;
                while bytes.get(gt).is_some_and(u8::is_ascii_whitespace) {
                    gt += 1;
                }
                if bytes.get(gt) == Some(&b'>') {
                    self.pos = gt + 1;
                    return self.slice(start, open);
                }
            }
            at = open + 1;
        }
        self.pos = self.src.len();
        self.slice(start, self.pos)
    }

    fn tag_name(&mut self) -> Option<String> {
        let start = self.bump_while(is_name_char);
        (self.pos > start).then(|| self.slice(start, self.pos).to_ascii_lowercase())
    }

    fn end_tag(&mut self) -> Option<String> {
        self.pos += 2;
        self.skip_whitespace();
        let name = self.tag_name()?;
        self.bump_while(|b| b != b'>');
        if self.at_end() {
            return None;
        }
        self.pos += 1;
        Some(name)
    }

    fn start_tag(&mut self) -> Option<Token> {
        self.pos += 1;
        if !self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            return None;
        }
        let name = self.tag_name()?;
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.peek()? {
                b'>' => {
                    self.pos += 1;
                    break;
                }
                b'/' => {
                    self.pos += 1;
                    self_closing = true;
                    continue;
                }
                _ => self_closing = false,
            }

            let start = self.bump_while(is_attr_name_char);
            if self.pos == start {
                // Lone quote or `=`; drop it.
                self.pos += 1;
                continue;
            }
            let attr = self.slice(start, self.pos).to_ascii_lowercase();
            self.skip_whitespace();
            let value = if self.peek() == Some(b'=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attr_value()
            } else {
                ""
            };

            // First occurrence wins for duplicated attributes.
            if !attrs.iter().any(|(seen, _)| *seen == attr) {
                attrs.push((attr, decode_entities(value)));
            }
        }

        Some(Token::Start {
            name,
            attrs,
            self_closing,
        })
    }

    fn attr_value(&mut self) -> &'a str {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.bump_while(|b| b != quote);
                let value = self.slice(start, self.pos);
                if !self.at_end() {
                    self.pos += 1;
                }
                value
            }
            _ => {
                let start = self.bump_while(|b| !b.is_ascii_whitespace() && b != b'>');
                self.slice(start, self.pos)
            }
        }
    }
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn is_attr_name_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'>' | b'/' | b'=' | b'"' | b'\'')
}

#[cfg(test)]
mod tests {
    use super::Token;
    use super::tokenize;

    #[test]
    fn script_body_is_raw_text() {
        let tokens = tokenize("<script>if (a < b) { x = '&amp;'; }</script>");
        assert_eq!(
            tokens,
            vec![
                Token::Start {
                    name: "script".to_owned(),
                    attrs: Vec::new(),
                    self_closing: false,
                },
                Token::RawText("if (a < b) { x = '&amp;'; }".to_owned()),
                Token::End {
                    name: "script".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn attributes_are_lowercased_and_decoded() {
        let tokens = tokenize("<A HREF='/x?a=1&amp;b=2' data-Flag>");
        assert_eq!(
            tokens,
            vec![Token::Start {
                name: "a".to_owned(),
                attrs: vec![
                    ("href".to_owned(), "/x?a=1&b=2".to_owned()),
                    ("data-flag".to_owned(), String::new()),
                ],
                self_closing: false,
            }]
        );
    }

    #[test]
    fn keeps_comments_and_skips_doctype() {
        let tokens = tokenize("<!DOCTYPE html><!-- note -->x");
        assert_eq!(
            tokens,
            vec![
                Token::Comment(" note ".to_owned()),
                Token::Text("x".to_owned()),
            ]
        );
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        let tokens = tokenize("a < b");
        assert_eq!(
            tokens,
            vec![Token::Text("a ".to_owned()), Token::Text("< b".to_owned())]
        );
    }
}
