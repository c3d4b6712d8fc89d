//! Page keys: the relative object paths the content proxy serves under `/site/`.

use url::Url;

const INDEX_DOCUMENT: &str = "index.html";
/// Synthetic base used to borrow standard relative-URL resolution for keys.
const KEY_BASE: &str = "http://key.invalid/";

/// Derives the page key from the current page path.
///
/// One leading `<shell_prefix>/` segment is stripped, and directory paths map to
/// their `index.html`. The result is never empty and never starts with `/`.
pub fn current_key(path: &str, shell_prefix: &str) -> String {
    let decoded = percent_decode(path);
    let trimmed = decoded.trim_start_matches('/');
    let rest = if shell_prefix.is_empty() {
        trimmed
    } else if trimmed == shell_prefix {
        ""
    } else {
        trimmed
            .strip_prefix(shell_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(trimmed)
    };
    with_index(rest.trim_start_matches('/'))
}

/// Resolves `reference` against the directory of `base_key`, keeping only the
/// path in its URL-encoded form. `..` segments cannot climb above the content
/// root.
pub fn resolve_key(base_key: &str, reference: &str) -> String {
    let Ok(root) = Url::parse(KEY_BASE) else {
        return reference.trim().trim_start_matches('/').to_owned();
    };
    let base = root.join(&encode_key(base_key)).unwrap_or(root);
    let resolved = match base.join(reference.trim()) {
        Ok(resolved) => resolved,
        Err(_) => base,
    };
    resolved.path().trim_start_matches('/').to_owned()
}

/// True for references the rewriter must leave alone: absolute URLs of any
/// scheme (`data:` and `blob:` included), protocol-relative `//host` URLs,
/// fragment-only links and empty values.
pub fn is_passthrough_reference(reference: &str) -> bool {
    let trimmed = reference.trim();
    trimmed.is_empty()
        || trimmed.starts_with("//")
        || trimmed.starts_with('#')
        || Url::parse(trimmed).is_ok()
}

/// `<origin>/site/<key>` with each key segment percent-encoded.
pub fn site_url(origin: &str, key: &str) -> String {
    format!("{}/site/{}", origin.trim_end_matches('/'), encode_key(key))
}

/// Percent-encodes everything except ASCII alphanumerics, `_.-~` and `/`.
/// Existing `%XX` escapes pass through, so already-encoded paths from
/// [`resolve_key`] are not encoded twice.
pub fn encode_key(key: &str) -> String {
    let bytes = key.as_bytes();
    let mut out = String::with_capacity(key.len());
    for (index, byte) in bytes.iter().copied().enumerate() {
        let escape = byte == b'%'
            && bytes
                .get(index + 1..index + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if escape || byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-' | b'~' | b'/') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let decoded = input
                .get(index + 1..index + 3)
                .filter(|hex| hex.bytes().all(|byte| byte.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn with_index(path: &str) -> String {
    if path.is_empty() {
        INDEX_DOCUMENT.to_owned()
    } else if path.ends_with('/') {
        format!("{path}{INDEX_DOCUMENT}")
    } else {
        path.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::current_key;
    use super::encode_key;
    use super::is_passthrough_reference;
    use super::resolve_key;
    use super::site_url;
    use url::Url;

    #[test]
    fn strips_one_shell_prefix_segment() {
        assert_eq!(current_key("/shell/options.html", "shell"), "options.html");
        assert_eq!(current_key("/shell/shell/a.html", "shell"), "shell/a.html");
        assert_eq!(current_key("/shellfish/a.html", "shell"), "shellfish/a.html");
        assert_eq!(current_key("/docs/guide.html", "shell"), "docs/guide.html");
    }

    #[test]
    fn maps_empty_and_directory_paths_to_index() {
        assert_eq!(current_key("", "shell"), "index.html");
        assert_eq!(current_key("/", "shell"), "index.html");
        assert_eq!(current_key("/shell", "shell"), "index.html");
        assert_eq!(current_key("/shell/", "shell"), "index.html");
        assert_eq!(current_key("/shell/docs/", "shell"), "docs/index.html");
        assert_eq!(current_key("//shell//x.html", "shell"), "x.html");
    }

    #[test]
    fn decodes_percent_escapes_in_paths() {
        assert_eq!(current_key("/shell/my%20page.html", "shell"), "my page.html");
        assert_eq!(current_key("/bad%zzescape", "shell"), "bad%zzescape");
    }

    #[test]
    fn resolves_relative_references_like_urls() {
        assert_eq!(resolve_key("docs/guide.html", "style.css"), "docs/style.css");
        assert_eq!(resolve_key("docs/guide.html", "../img/a.png"), "img/a.png");
        assert_eq!(resolve_key("docs/guide.html", "/root.css"), "root.css");
        assert_eq!(resolve_key("index.html", "../../../x.js"), "x.js");
        assert_eq!(resolve_key("a/b.html", "./c/?v=2#top"), "a/c/");
        assert_eq!(resolve_key("docs/a.html", "../"), "");
        assert_eq!(resolve_key("a.html", "x%2Fy.css"), "x%2Fy.css");
        assert_eq!(resolve_key("a.html", "my file.css"), "my%20file.css");
        assert_eq!(resolve_key("a/b.html", "app.js?v=3"), "a/app.js");
    }

    #[test]
    fn resolution_agrees_with_url_join() {
        let base = match Url::parse("https://pages.example.com/") {
            Ok(base) => base,
            Err(error) => panic!("{error}"),
        };
        let cases = [
            ("index.html", "main.js"),
            ("docs/a/b.html", "../c.css"),
            ("docs/a/b.html", "../../../../d.css"),
            ("x/y.html", "z/w.png"),
            ("x/y.html", "/top.png"),
            ("a/b.html", "./c/"),
            ("docs/a.html", "../"),
            ("docs/a.html", "sub/"),
            ("a.html", "x%2Fy.css"),
            ("a.html", "caf\u{e9} menu.css"),
        ];
        for (key, reference) in cases {
            let expected = match base.join(key).and_then(|page| page.join(reference)) {
                Ok(url) => url.path().trim_start_matches('/').to_owned(),
                Err(error) => panic!("{error}"),
            };
            assert_eq!(resolve_key(key, reference), expected, "{key} + {reference}");
        }
    }

    #[test]
    fn passthrough_references_are_recognized() {
        for reference in [
            "https://cdn.example.com/a.js",
            "//cdn.example.com/a.js",
            "data:image/png;base64,AAAA",
            "blob:https://example.com/1234",
            "#section",
            "mailto:team@example.com",
            "",
        ] {
            assert!(is_passthrough_reference(reference), "{reference}");
        }
        for reference in ["style.css", "./a/b.js", "../up.png", "/rooted.css"] {
            assert!(!is_passthrough_reference(reference), "{reference}");
        }
    }

    #[test]
    fn site_urls_encode_segments_and_keep_slashes() {
        assert_eq!(
            site_url("http://127.0.0.1:5000/", "docs/my page.html"),
            "http://127.0.0.1:5000/site/docs/my%20page.html"
        );
        assert_eq!(encode_key("a(b)&c~d_e.f-g"), "a%28b%29%26c~d_e.f-g");
        assert_eq!(encode_key("ü"), "%C3%BC");
        assert_eq!(encode_key("x%2Fy.css"), "x%2Fy.css");
        assert_eq!(encode_key("100%.html"), "100%25.html");
        assert_eq!(
            site_url("http://p.test", &resolve_key("docs/a.html", "my file%2Fpart.css")),
            "http://p.test/site/docs/my%20file%2Fpart.css"
        );
    }
}
