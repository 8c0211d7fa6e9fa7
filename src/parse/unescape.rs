/// Resolves backslash escapes inside a double-quoted string (quotes already
/// stripped). Only `$`, `` ` ``, `"`, `\` and newline can be escaped; any
/// other backslash is kept as-is.
pub fn unescape_double_quoted(s: &str) -> String {
    let mut chars = s.chars().peekable();

    let mut res = String::with_capacity(s.len());

    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }

        if let Some(escaped) = chars.next_if(|c| matches!(c, '$' | '`' | '"' | '\\')) {
            res.push(escaped);
        } else if chars.next_if_eq(&'\n').is_none() {
            // not a line continuation either, keep the backslash
            res.push(c);
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::unescape_double_quoted;

    #[test]
    fn escapable_characters() {
        assert_eq!(unescape_double_quoted(r#"\"hi\" \\ \$HOME \`"#), r#""hi" \ $HOME `"#);
    }

    #[test]
    fn other_backslashes_are_literal() {
        assert_eq!(unescape_double_quoted(r"a\nb\t"), r"a\nb\t");
        assert_eq!(unescape_double_quoted(r"trailing\"), r"trailing\");
    }

    #[test]
    fn line_continuation() {
        assert_eq!(unescape_double_quoted("a\\\nb"), "ab");
    }
}
