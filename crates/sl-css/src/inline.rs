use crate::parse_declarations;

/// Editable view of an element's `style` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn parse(attribute: &str) -> Self {
        let mut style = Self::default();
        for (name, value) in parse_declarations(attribute) {
            style.set(&name, &value);
        }
        style
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets or replaces a property, keeping its original position.
    pub fn set(&mut self, name: &str, value: &str) {
        let name = name.trim().to_ascii_lowercase();
        match self.declarations.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.trim().to_owned(),
            None => self.declarations.push((name, value.trim().to_owned())),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.declarations.len();
        self.declarations
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        before != self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn to_attribute_value(&self) -> String {
        self.declarations
            .iter()
            .map(|(name, value)| format!("{name}: {value};"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::InlineStyle;

    #[test]
    fn edits_preserve_other_properties() {
        let mut style = InlineStyle::parse("color: red; visibility : hidden;pointer-events:none");
        assert_eq!(style.get("visibility"), Some("hidden"));

        style.remove("visibility");
        style.set("opacity", "0");
        style.set("color", "blue");
        assert_eq!(
            style.to_attribute_value(),
            "color: blue; pointer-events: none; opacity: 0;"
        );
    }

    #[test]
    fn empty_attribute_parses_to_empty_style() {
        let style = InlineStyle::parse("  ;; ");
        assert!(style.is_empty());
        assert_eq!(style.to_attribute_value(), "");
    }
}
