//! Token estimation for module texts.
//!
//! Budgets are computed from UTF-8 byte length, one token per four bytes,
//! so accented Portuguese modules cost slightly more than their char count.

/// Estimated tokens for `text`, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_module_is_free() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn partial_tokens_round_up() {
        assert_eq!(estimate_tokens("calm"), 1);
        assert_eq!(estimate_tokens("calma"), 2);
    }

    #[test]
    fn accents_count_as_bytes() {
        // "atenção" is 9 bytes
        assert_eq!(estimate_tokens("atenção"), 3);
    }

    #[test]
    fn module_sized_text() {
        assert_eq!(estimate_tokens(&"Background notes. ".repeat(10)), 45);
    }
}
