//! CSS rule splitting and inline style editing.

mod inline;
mod scan;

pub use inline::InlineStyle;

/// One top-level entry of a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    /// `selector { declarations }` with normalized declarations.
    Style {
        selector: String,
        declarations: String,
    },
    /// Conditional group such as `@media` or `@supports`, nested rules kept.
    Group { prelude: String, rules: Vec<CssRule> },
    /// Any other block at-rule (`@keyframes`, `@font-face`), body kept verbatim.
    AtBlock { prelude: String, body: String },
    /// Statement at-rule such as `@import url(a.css)`.
    AtStatement(String),
}

impl CssRule {
    /// Serialized text of the rule, stable across repeated parses.
    pub fn css_text(&self) -> String {
        match self {
            Self::Style {
                selector,
                declarations,
            } => format!("{selector}{{{declarations}}}"),
            Self::Group { prelude, rules } => {
                let inner = rules.iter().map(CssRule::css_text).collect::<String>();
                format!("{prelude}{{{inner}}}")
            }
            Self::AtBlock { prelude, body } => format!("{prelude}{{{body}}}"),
            Self::AtStatement(text) => format!("{text};"),
        }
    }

    pub fn style_rule_count(&self) -> usize {
        match self {
            Self::Style { .. } => 1,
            Self::Group { rules, .. } => rules.iter().map(CssRule::style_rule_count).sum(),
            Self::AtBlock { .. } | Self::AtStatement(_) => 0,
        }
    }
}

/// Rules parsed from one stylesheet source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheet {
    pub rules: Vec<CssRule>,
}

impl StyleSheet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Number of style rules, counting those nested in groups.
    pub fn style_rule_count(&self) -> usize {
        self.rules.iter().map(CssRule::style_rule_count).sum()
    }

    pub fn css_text(&self) -> String {
        self.rules
            .iter()
            .map(CssRule::css_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Top-level rules whose serialized text mentions any of `markers`.
    pub fn rules_mentioning<'a>(&'a self, markers: &'a [String]) -> impl Iterator<Item = &'a CssRule> {
        self.rules.iter().filter(move |rule| {
            let text = rule.css_text();
            markers.iter().any(|marker| text.contains(marker.as_str()))
        })
    }
}

/// Parses CSS source text.
#[derive(Debug, Default)]
pub struct CssParser;

impl CssParser {
    pub fn parse(&self, input: &str) -> StyleSheet {
        let sanitized = scan::strip_comments(input);
        StyleSheet {
            rules: parse_rules(&sanitized),
        }
    }
}

fn parse_rules(input: &str) -> Vec<CssRule> {
    let mut out = Vec::new();
    let mut cursor = 0_usize;

    loop {
        cursor = skip_separators(input, cursor);
        if cursor >= input.len() {
            break;
        }

        let open = scan::find_top_level(input, cursor, b'{');
        let head = &input[..open.unwrap_or(input.len())];
        if let Some(semi) = scan::find_top_level(head, cursor, b';') {
            let statement = scan::collapse_whitespace(&input[cursor..semi]);
            if statement.starts_with('@') {
                out.push(CssRule::AtStatement(statement));
            }
            cursor = semi.saturating_add(1);
            continue;
        }

        let Some(open) = open else {
            break;
        };
        let Some(close) = scan::find_matching_brace(input, open) else {
            break;
        };

        let prelude = scan::collapse_whitespace(&input[cursor..open]);
        let body = &input[open.saturating_add(1)..close];
        cursor = close.saturating_add(1);

        if let Some(rule) = build_rule(prelude, body) {
            out.push(rule);
        }
    }

    out
}

fn build_rule(prelude: String, body: &str) -> Option<CssRule> {
    if prelude.is_empty() {
        return None;
    }

    if prelude.starts_with('@') {
        if is_grouping_at_rule(&prelude) {
            let rules = parse_rules(body);
            return (!rules.is_empty()).then_some(CssRule::Group { prelude, rules });
        }
        let body = body.trim();
        return Some(CssRule::AtBlock {
            prelude,
            body: body.to_owned(),
        });
    }

    let declarations = normalize_declarations(body);
    if declarations.is_empty() {
        return None;
    }

    Some(CssRule::Style {
        selector: prelude,
        declarations,
    })
}

fn skip_separators(input: &str, mut idx: usize) -> usize {
    let bytes = input.as_bytes();
    while idx < bytes.len() && (bytes[idx].is_ascii_whitespace() || bytes[idx] == b';') {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_grouping_at_rule(prelude: &str) -> bool {
    let lower = prelude.to_ascii_lowercase();
    ["@media", "@supports", "@layer", "@container", "@document"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

pub(crate) fn parse_declarations(input: &str) -> Vec<(String, String)> {
    scan::split_top_level(input, b';')
        .into_iter()
        .filter_map(|declaration| {
            let trimmed = declaration.trim();
            let colon = scan::find_top_level(trimmed, 0, b':')?;
            let name = trimmed[..colon].trim().to_ascii_lowercase();
            let value = scan::normalize_value(&trimmed[colon.saturating_add(1)..]);
            (!name.is_empty() && !value.is_empty()).then_some((name, value))
        })
        .collect()
}

fn normalize_declarations(input: &str) -> String {
    parse_declarations(input)
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join(";")
}
