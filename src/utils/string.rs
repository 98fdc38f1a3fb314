/// Convert bytes to a trimmed string, handling UTF-8 conversion errors gracefully
pub fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Escape a word for the remote POSIX shell.
///
/// Words made only of characters the shell never interprets are passed
/// through as-is; everything else is single-quoted.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.' | ':' | '=' | ',' | '@' | '+')
    }) {
        return s.to_string();
    }

    // End the quote, emit an escaped quote, start a new quote
    let escaped = s.replace('\'', "'\"'\"'");
    format!("'{}'", escaped)
}

/// Indent every line of `text` for nested progress output.
pub fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_escape_plain_words() {
        assert_eq!(shell_escape("/usr/local/bin/k3s-uninstall.sh"), "/usr/local/bin/k3s-uninstall.sh");
        assert_eq!(
            shell_escape("K3S_URL=https://10.0.0.1:6443"),
            "K3S_URL=https://10.0.0.1:6443"
        );
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn test_shell_escape_quotes_metacharacters() {
        assert_eq!(shell_escape("a b"), "'a b'");
        assert_eq!(shell_escape("$(reboot)"), "'$(reboot)'");
        assert_eq!(shell_escape("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_escape("x;y"), "'x;y'");
    }

    #[test]
    fn test_bytes_to_string_trims() {
        assert_eq!(bytes_to_string(b"  token\n"), "token");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\nb", "  "), "  a\n  b");
        assert_eq!(indent("", "  "), "");
    }
}
