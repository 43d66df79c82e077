//! RFC 5322 / RFC 5321 lexical checks shared by the header value types.

/// Returns true for RFC 5322 `atext` characters.
pub(crate) const fn is_atext(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

/// Returns true if `s` is `dot-atom-text` (atoms separated by single dots).
pub(crate) fn is_dot_atom(s: &str) -> bool {
    !s.is_empty()
        && s
            .split('.')
            .all(|atom| !atom.is_empty() && atom.bytes().all(is_atext))
}

/// Returns true if `s` is a `[...]` domain literal made of `dtext`.
pub(crate) fn is_domain_literal(s: &str) -> bool {
    s.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|inner| {
            inner
                .bytes()
                .all(|b| b.is_ascii_graphic() && !matches!(b, b'[' | b']' | b'\\'))
        })
}

/// Returns true if `s` is a host name of letter-digit-hyphen labels.
pub(crate) fn is_hostname(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// Returns true if `s` contains a control character other than tab.
pub(crate) fn has_control(s: &str) -> bool {
    s.chars().any(|c| c.is_control() && c != '\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_atom() {
        assert!(is_dot_atom("john.doe"));
        assert!(is_dot_atom("a+tag"));
        assert!(!is_dot_atom(""));
        assert!(!is_dot_atom(".lead"));
        assert!(!is_dot_atom("trail."));
        assert!(!is_dot_atom("two..dots"));
        assert!(!is_dot_atom("a(b)"));
        assert!(!is_dot_atom("a\"b"));
    }

    #[test]
    fn test_domain_literal() {
        assert!(is_domain_literal("[192.0.2.1]"));
        assert!(is_domain_literal("[]"));
        assert!(!is_domain_literal("192.0.2.1"));
        assert!(!is_domain_literal("[a[b]"));
        assert!(!is_domain_literal("[a b]"));
    }

    #[test]
    fn test_hostname() {
        assert!(is_hostname("example.com"));
        assert!(is_hostname("mail-1.example.com"));
        assert!(is_hostname("localhost"));
        assert!(!is_hostname("exa[m]ple.com"));
        assert!(!is_hostname("-bad.example.com"));
        assert!(!is_hostname("under_score.example.com"));
        assert!(!is_hostname("bad domain"));
        assert!(!is_hostname(&"a".repeat(64)));
    }

    #[test]
    fn test_control_characters() {
        assert!(!has_control("plain\ttext"));
        assert!(has_control("nul\0byte"));
        assert!(has_control("line\nbreak"));
        assert!(has_control("bell\x07"));
    }
}
