/// Makes a provider's place name safe to embed in a filename.
///
/// Whitespace runs collapse to one space, characters that are illegal on
/// common filesystems are dropped, and the filename separator is replaced
/// so the name still parses back unambiguously.
pub fn normalize_city(raw: &str, separator: char) -> Option<String> {
    let replacement = if separator == '-' { ' ' } else { '-' };
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if is_disallowed_char(ch) {
            continue;
        }
        if ch == separator {
            out.push(replacement);
        } else {
            out.push(ch);
        }
    }

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed
        .trim_matches(|c: char| c == '.' || c == ' ' || c == '-' || c == separator)
        .to_string();

    (!trimmed.is_empty()).then_some(trimmed)
}

/// Accepts only two-letter alphabetic codes and upper-cases them.
pub fn normalize_country(raw: &str) -> Option<String> {
    let code = raw.trim();
    let valid = code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic());
    valid.then(|| code.to_ascii_uppercase())
}

fn is_disallowed_char(ch: char) -> bool {
    matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        || ch == '\0'
        || ch.is_control()
}
