//! Variable-token recognition in raw log text.
//!
//! A token is a maximal run of non-delimiter bytes. The delimiter set is
//! fixed: everything except `+ - . _ \` and ASCII alphanumerics. A token
//! is classified as a *variable* iff any of:
//!
//! - it contains a decimal digit,
//! - it is a multi-digit hex value (length >= 2, all bytes in
//!   `[0-9A-Fa-f]`),
//! - it is directly preceded by `=` and contains an alphabetic character.
//!
//! Everything else is static text. Note the hex rule intentionally
//! captures letter-only tokens like `deadbeef`; short English words made
//! of hex letters become variables too, which trades a few extra
//! dictionary entries for never missing a real hex ID.

/// Whether `c` separates tokens.
pub fn is_delim(c: u8) -> bool {
    !(c == b'+' || c == b'-' || c == b'.' || c == b'_' || c == b'\\' || c.is_ascii_alphanumeric())
}

pub fn is_alphabet(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

pub fn is_decimal_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

/// Whether `token` could be a multi-digit hex value.
pub fn could_be_multi_digit_hex(token: &[u8]) -> bool {
    if token.len() < 2 {
        return false;
    }
    token
        .iter()
        .all(|&c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c) || (b'A'..=b'F').contains(&c))
}

/// Finds the bounds of the next *variable* token in `text`.
///
/// `begin` and `end` carry the bounds of the previous variable (both 0
/// before the first call); on success they are updated to the next
/// variable's bounds. Non-variable tokens are skipped. Returns `false`
/// when no further variable exists.
pub fn next_variable_bounds(text: &[u8], begin: &mut usize, end: &mut usize) -> bool {
    let len = text.len();

    loop {
        // Start at the end of the previous token and skip delimiters
        let mut b = *end;
        while b < len && is_delim(text[b]) {
            b += 1;
        }
        if b == len {
            return false;
        }

        // Extend to the next delimiter, tracking classification hints
        let mut e = b;
        let mut contains_digit = false;
        let mut contains_alpha = false;
        while e < len && !is_delim(text[e]) {
            let c = text[e];
            if is_decimal_digit(c) {
                contains_digit = true;
            } else if is_alphabet(c) {
                contains_alpha = true;
            }
            e += 1;
        }

        let is_var = contains_digit
            || could_be_multi_digit_hex(&text[b..e])
            || (b > 0 && text[b - 1] == b'=' && contains_alpha);

        *begin = b;
        *end = e;
        if is_var {
            return true;
        }
    }
}

/// Collects every variable token in `text`, in order. Convenience for
/// tests and the query planner.
pub fn variable_tokens(text: &[u8]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut begin = 0;
    let mut end = 0;
    while next_variable_bounds(text, &mut begin, &mut end) {
        out.push((begin, end));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars_of(text: &str) -> Vec<&str> {
        variable_tokens(text.as_bytes())
            .into_iter()
            .map(|(b, e)| &text[b..e])
            .collect()
    }

    #[test]
    fn delimiter_set() {
        for c in b"abcXYZ059+-._\\".iter() {
            assert!(!is_delim(*c), "{} should not be a delimiter", *c as char);
        }
        for c in b" \t:;,()[]{}=\"'/<>|@#$%^&*!?~`\n".iter() {
            assert!(is_delim(*c), "{} should be a delimiter", *c as char);
        }
    }

    #[test]
    fn digits_make_variables() {
        assert_eq!(vars_of("connected to host port 443"), vec!["443"]);
        assert_eq!(
            vars_of("transferred 1048576 bytes in 1.23 seconds"),
            vec!["1048576", "1.23"]
        );
    }

    #[test]
    fn ip_address_is_one_token() {
        // '.' is not a delimiter, so the address stays whole
        assert_eq!(vars_of("connected to 10.1.2.3 ok"), vec!["10.1.2.3"]);
    }

    #[test]
    fn hex_rule() {
        assert!(could_be_multi_digit_hex(b"deadbeef"));
        assert!(could_be_multi_digit_hex(b"A1"));
        assert!(!could_be_multi_digit_hex(b"f"));
        assert!(!could_be_multi_digit_hex(b"xyz12"));
        assert_eq!(vars_of("checksum deadbeef done"), vec!["deadbeef"]);
    }

    #[test]
    fn equals_prefix_rule() {
        assert_eq!(vars_of("user=alice logged in"), vec!["alice"]);
        // Without '=', a letters-only non-hex token is static text
        assert_eq!(vars_of("alice logged in"), Vec::<&str>::new());
    }

    #[test]
    fn no_variables_in_plain_text() {
        assert_eq!(vars_of("disconnected"), Vec::<&str>::new());
        assert_eq!(vars_of("shutting down now"), Vec::<&str>::new());
    }

    #[test]
    fn mixed_alnum_token_is_variable() {
        assert_eq!(vars_of("task task-17 finished"), vec!["task-17"]);
    }

    #[test]
    fn bounds_iterate_in_order() {
        let text = b"a=1 b=2 c=3";
        let mut begin = 0;
        let mut end = 0;
        let mut seen = Vec::new();
        while next_variable_bounds(text, &mut begin, &mut end) {
            seen.push(std::str::from_utf8(&text[begin..end]).unwrap().to_string());
        }
        assert_eq!(seen, vec!["1", "2", "3"]);
    }

    #[test]
    fn empty_and_delim_only_input() {
        assert_eq!(vars_of(""), Vec::<&str>::new());
        assert_eq!(vars_of("   ::: "), Vec::<&str>::new());
    }
}
