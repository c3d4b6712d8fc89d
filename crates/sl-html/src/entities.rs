/// Decodes named and numeric character references. Unknown references stay literal.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(rel_amp) = input[cursor..].find('&') {
        let amp = cursor + rel_amp;
        out.push_str(&input[cursor..amp]);

        let rest = &input[(amp + 1)..];
        let Some(rel_semi) = rest.find(';').filter(|idx| *idx <= 32) else {
            out.push('&');
            cursor = amp + 1;
            continue;
        };

        let semi = amp + 1 + rel_semi;
        let entity = &input[(amp + 1)..semi];
        if let Some(decoded) = decode_entity(entity) {
            out.push(decoded);
            cursor = semi + 1;
        } else {
            out.push('&');
            cursor = amp + 1;
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    let named = match entity {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "copy" => Some('\u{a9}'),
        "reg" => Some('\u{ae}'),
        "trade" => Some('\u{2122}'),
        "hellip" => Some('\u{2026}'),
        "mdash" => Some('\u{2014}'),
        "ndash" => Some('\u{2013}'),
        "lsquo" => Some('\u{2018}'),
        "rsquo" => Some('\u{2019}'),
        "ldquo" => Some('\u{201c}'),
        "rdquo" => Some('\u{201d}'),
        "middot" => Some('\u{b7}'),
        "bull" => Some('\u{2022}'),
        "times" => Some('\u{d7}'),
        "euro" => Some('\u{20ac}'),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        let value = u32::from_str_radix(hex, 16).ok()?;
        char::from_u32(value)
    } else if let Some(dec) = entity.strip_prefix('#') {
        let value = dec.parse::<u32>().ok()?;
        char::from_u32(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::decode_entities;

    #[test]
    fn decodes_named_and_numeric_references() {
        assert_eq!(decode_entities("a &amp; b &#169; &#x2014;"), "a & b \u{a9} \u{2014}");
    }

    #[test]
    fn leaves_unknown_references_untouched() {
        assert_eq!(decode_entities("AT&T; &bogus; &"), "AT&T; &bogus; &");
    }
}
