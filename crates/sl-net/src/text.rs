//! Charset-aware decoding of text bodies.

use encoding_rs::Encoding;
use encoding_rs::UTF_8;

const META_SNIFF_BYTES: usize = 8192;

/// Decodes `body` using, in order: a byte-order mark, a `<meta charset>` in
/// HTML prefixes, the `charset` parameter of `content_type`, then UTF-8.
pub fn decode_text(body: &[u8], content_type: &str) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(body) {
        let (decoded, _) = encoding.decode_without_bom_handling(&body[bom_len..]);
        return decoded.into_owned();
    }

    let encoding = detect_charset(body, content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn detect_charset(body: &[u8], content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let looks_like_html =
        lower.is_empty() || lower.contains("text/html") || lower.contains("application/xhtml+xml");

    if looks_like_html {
        if let Some(label) = charset_from_html_prefix(body) {
            return Some(label);
        }
    }

    charset_from_content_type(content_type)
}

pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches(|ch| ch == '"' || ch == '\'');
        (!label.is_empty()).then(|| label.to_owned())
    })
}

fn charset_from_html_prefix(body: &[u8]) -> Option<String> {
    let prefix = String::from_utf8_lossy(&body[..body.len().min(META_SNIFF_BYTES)]);
    let lower = prefix.to_ascii_lowercase();

    lower.match_indices("charset=").find_map(|(idx, needle)| {
        let rest = prefix[idx + needle.len()..].trim_start();
        let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'');
        let label = match quote {
            Some(quote) => {
                let inner = &rest[1..];
                &inner[..inner.find(quote)?]
            }
            None => {
                let end = rest
                    .find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | ';' | '>' | '/'))
                    .unwrap_or(rest.len());
                &rest[..end]
            }
        };
        let label = label.trim();
        (!label.is_empty()).then(|| label.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::charset_from_content_type;
    use super::decode_text;

    #[test]
    fn honours_content_type_charset() {
        let body = [0x63, 0x61, 0x66, 0xe9];
        assert_eq!(decode_text(&body, "text/plain; charset=ISO-8859-1"), "café");
    }

    #[test]
    fn meta_charset_wins_for_html() {
        let mut body = b"<html><head><meta charset=\"windows-1252\"></head><body>".to_vec();
        body.push(0x80);
        assert!(decode_text(&body, "text/html; charset=utf-8").ends_with('\u{20ac}'));
    }

    #[test]
    fn falls_back_to_utf8_and_strips_bom() {
        assert_eq!(decode_text("héllo".as_bytes(), "application/json"), "héllo");
        assert_eq!(decode_text(b"\xEF\xBB\xBFhi", ""), "hi");
    }

    #[test]
    fn parses_quoted_charset_parameter() {
        assert_eq!(
            charset_from_content_type("text/html; charset=\"Shift_JIS\""),
            Some("Shift_JIS".to_owned())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }
}
