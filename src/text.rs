// Longest prefix of `text` holding at most `limit` characters
pub fn prefix_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuts_on_character_boundaries() {
        assert_eq!(prefix_chars("héllo", 2), "hé");
        assert_eq!(prefix_chars("short", 10), "short");
        assert_eq!(prefix_chars("", 10), "");
        assert_eq!(prefix_chars("abc", 0), "");
    }
}
