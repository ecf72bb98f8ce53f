/// Quote_if_bare turns a bare literal like `service` into a quoted JQ string
/// constant (`"service"`) so a mapping author can write a fixed blueprint name or
/// relation target without learning JQ string syntax. Anything that looks like it
/// might already be an expression (starts with `.`, `$`, `(`, `[`, `{`, or a quote,
/// or contains characters no bare identifier would) is passed through unchanged.
pub(crate) fn quote_if_bare(src: &str) -> String {
    let trimmed = src.trim();
    if trimmed.is_empty() || !is_bare_identifier(trimmed) {
        return src.to_string();
    }
    serde_json::to_string(trimmed).unwrap_or_else(|_| src.to_string())
}

fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_bare_identifiers() {
        assert_eq!(quote_if_bare("service"), "\"service\"");
        assert_eq!(quote_if_bare("my-kind_1"), "\"my-kind_1\"");
    }

    #[test]
    fn leaves_expressions_alone() {
        assert_eq!(quote_if_bare(".name"), ".name");
        assert_eq!(quote_if_bare("\"literal\""), "\"literal\"");
        assert_eq!(quote_if_bare(".items[] | select(.x)"), ".items[] | select(.x)");
    }
}
