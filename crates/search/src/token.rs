//! Query tokens: splitting a normalized wildcard search string into
//! tokens and classifying how each one may be interpreted.
//!
//! Tokenization follows the encoder's delimiter rules, except that
//! wildcards are part of tokens and an escape retains its character. A
//! token that the variable heuristics flag (`is_var`) but that carries
//! wildcards is *ambiguous*: it may stand for static text, an integer
//! variable, a float variable, or a dictionary variable, and the planner
//! enumerates one subquery per combination of interpretations.

use logcask_codec::tokens::{could_be_multi_digit_hex, is_alphabet, is_decimal_digit, is_delim};
use logcask_codec::{encode_float_token, encode_integer_token};
use logcask_core::wildcard::is_wildcard;

/// Finds the next potential-variable token in `value`, including any
/// wildcards it carries. `begin_pos`/`end_pos` carry the previous
/// token's bounds (both 0 initially); `is_var` reports whether the
/// token hit one of the variable heuristics. Returns `false` when the
/// string is exhausted.
pub fn get_bounds_of_next_potential_var(
    value: &str,
    begin_pos: &mut usize,
    end_pos: &mut usize,
    is_var: &mut bool,
) -> bool {
    let bytes = value.as_bytes();
    let value_length = bytes.len();
    if *end_pos >= value_length {
        return false;
    }

    *is_var = false;
    let mut contains_wildcard = false;

    while !*is_var && !contains_wildcard && *begin_pos < value_length {
        // Start at the end of the previous token
        *begin_pos = *end_pos;

        // Find the next wildcard or non-delimiter
        let mut is_escaped = false;
        while *begin_pos < value_length {
            let c = bytes[*begin_pos];
            if is_escaped {
                is_escaped = false;
                if !is_delim(c) {
                    // Escaped non-delimiter starts the token; back up to
                    // retain the escape character
                    *begin_pos -= 1;
                    break;
                }
            } else if c == b'\\' {
                is_escaped = true;
            } else if is_wildcard(c as char) {
                contains_wildcard = true;
                break;
            } else if !is_delim(c) {
                break;
            }
            *begin_pos += 1;
        }

        let mut contains_decimal_digit = false;
        let mut contains_alphabet = false;

        // Find the next delimiter
        is_escaped = false;
        *end_pos = *begin_pos;
        while *end_pos < value_length {
            let c = bytes[*end_pos];
            if is_escaped {
                is_escaped = false;
                if is_delim(c) {
                    // Escaped delimiter ends the token; back up to retain
                    // the escape character
                    *end_pos -= 1;
                    break;
                }
            } else if c == b'\\' {
                is_escaped = true;
            } else if is_wildcard(c as char) {
                contains_wildcard = true;
            } else if is_delim(c) {
                break;
            }

            if is_decimal_digit(c) {
                contains_decimal_digit = true;
            } else if is_alphabet(c) {
                contains_alphabet = true;
            }
            *end_pos += 1;
        }

        // Variable heuristics, mirroring the encoder's
        if contains_decimal_digit
            || could_be_multi_digit_hex(strip_wildcards(&bytes[*begin_pos..*end_pos]).as_slice())
        {
            *is_var = true;
        } else if *begin_pos > 0 && bytes[*begin_pos - 1] == b'=' && contains_alphabet {
            // '=' rule holds only when no wildcard sits between the '='
            // and the first alphabetic character
            let mut found_wildcard_before_alphabet = false;
            let mut escaped = false;
            for &c in &bytes[*begin_pos..*end_pos] {
                if escaped {
                    escaped = false;
                    if is_alphabet(c) {
                        break;
                    }
                } else if c == b'\\' {
                    escaped = true;
                } else if is_wildcard(c as char) {
                    found_wildcard_before_alphabet = true;
                    break;
                } else if is_alphabet(c) {
                    break;
                }
            }
            if !found_wildcard_before_alphabet {
                *is_var = true;
            }
        }
    }

    *begin_pos != value_length
}

fn strip_wildcards(token: &[u8]) -> Vec<u8> {
    token
        .iter()
        .copied()
        .filter(|&c| !is_wildcard(c as char))
        .collect()
}

/// How a token may be interpreted when generating subqueries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// The token is exactly `*`.
    Wildcard,
    /// More than one of the types below is possible.
    Ambiguous,
    /// Static text inside a logtype.
    Logtype,
    DictionaryVar,
    FloatVar,
    IntVar,
}

#[derive(Debug, Clone)]
pub struct QueryToken {
    value: String,
    begin_pos: usize,
    end_pos: usize,
    /// The tokenizer's verdict, independent of the interpretation
    /// currently selected.
    flagged_as_var: bool,
    cannot_convert_to_non_dict_var: bool,
    contains_wildcards: bool,
    has_greedy_wildcard_in_middle: bool,
    has_prefix_greedy_wildcard: bool,
    has_suffix_greedy_wildcard: bool,
    token_type: TokenType,
    possible_types: Vec<TokenType>,
    current_possible_type_ix: usize,
}

impl QueryToken {
    pub fn new(query_string: &str, begin_pos: usize, end_pos: usize, is_var: bool) -> Self {
        let value = query_string[begin_pos..end_pos].to_string();
        let bytes = value.as_bytes();

        let mut unescaped_wildcard_positions = Vec::new();
        let mut escaped = false;
        for (i, &c) in bytes.iter().enumerate() {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if is_wildcard(c as char) {
                unescaped_wildcard_positions.push(i);
            }
        }
        let contains_wildcards = !unescaped_wildcard_positions.is_empty();
        let has_prefix_greedy_wildcard =
            unescaped_wildcard_positions.first() == Some(&0) && bytes.first() == Some(&b'*');
        let has_suffix_greedy_wildcard = !bytes.is_empty()
            && unescaped_wildcard_positions.last() == Some(&(bytes.len() - 1))
            && bytes.last() == Some(&b'*');
        let has_greedy_wildcard_in_middle = unescaped_wildcard_positions
            .iter()
            .any(|&i| i > 0 && i < bytes.len() - 1 && bytes[i] == b'*');

        let numeric_body = strip_wildcards(bytes);
        let could_be_int = !numeric_body.is_empty()
            && numeric_body
                .iter()
                .enumerate()
                .all(|(i, &c)| c.is_ascii_digit() || (i == 0 && c == b'-'));
        let could_be_float = numeric_body
            .iter()
            .enumerate()
            .all(|(i, &c)| c.is_ascii_digit() || c == b'.' || (i == 0 && c == b'-'))
            && numeric_body.iter().filter(|&&c| c == b'.').count() <= 1;

        let (token_type, possible_types, cannot_convert) = if value == "*" {
            (TokenType::Wildcard, Vec::new(), false)
        } else if !is_var {
            (TokenType::Logtype, Vec::new(), false)
        } else if !contains_wildcards {
            let t = if encode_integer_token(&value).is_some() {
                TokenType::IntVar
            } else if encode_float_token(&value).is_some() {
                TokenType::FloatVar
            } else {
                TokenType::DictionaryVar
            };
            (t, Vec::new(), false)
        } else {
            let mut possible = vec![TokenType::Logtype];
            if could_be_int {
                possible.push(TokenType::IntVar);
            }
            if could_be_float {
                possible.push(TokenType::FloatVar);
            }
            possible.push(TokenType::DictionaryVar);
            let cannot_convert = !could_be_int && !could_be_float;
            (TokenType::Ambiguous, possible, cannot_convert)
        };

        QueryToken {
            value,
            begin_pos,
            end_pos,
            flagged_as_var: is_var,
            cannot_convert_to_non_dict_var: cannot_convert,
            contains_wildcards,
            has_greedy_wildcard_in_middle,
            has_prefix_greedy_wildcard,
            has_suffix_greedy_wildcard,
            token_type,
            possible_types,
            current_possible_type_ix: 0,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn begin_pos(&self) -> usize {
        self.begin_pos
    }

    pub fn end_pos(&self) -> usize {
        self.end_pos
    }

    pub fn contains_wildcards(&self) -> bool {
        self.contains_wildcards
    }

    /// Whether the tokenizer's heuristics flagged this token as a
    /// variable, regardless of the currently selected interpretation.
    pub fn flagged_as_var(&self) -> bool {
        self.flagged_as_var
    }

    pub fn has_greedy_wildcard_in_middle(&self) -> bool {
        self.has_greedy_wildcard_in_middle
    }

    pub fn has_prefix_greedy_wildcard(&self) -> bool {
        self.has_prefix_greedy_wildcard
    }

    pub fn has_suffix_greedy_wildcard(&self) -> bool {
        self.has_suffix_greedy_wildcard
    }

    pub fn cannot_convert_to_non_dict_var(&self) -> bool {
        self.cannot_convert_to_non_dict_var
    }

    pub fn is_ambiguous_token(&self) -> bool {
        self.token_type == TokenType::Ambiguous
    }

    /// The interpretation currently selected for subquery generation.
    pub fn current_type(&self) -> TokenType {
        if self.token_type == TokenType::Ambiguous {
            self.possible_types[self.current_possible_type_ix]
        } else {
            self.token_type
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.token_type == TokenType::Wildcard
    }

    /// Whether the current interpretation treats the token as a
    /// variable.
    pub fn is_var(&self) -> bool {
        matches!(
            self.current_type(),
            TokenType::IntVar | TokenType::FloatVar | TokenType::DictionaryVar
        )
    }

    /// Advances to the next interpretation; wraps to the first and
    /// returns `false` when exhausted (odometer behavior).
    pub fn change_to_next_possible_type(&mut self) -> bool {
        if self.current_possible_type_ix + 1 < self.possible_types.len() {
            self.current_possible_type_ix += 1;
            true
        } else {
            self.current_possible_type_ix = 0;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(query: &str) -> Vec<QueryToken> {
        let mut tokens = Vec::new();
        let mut begin = 0;
        let mut end = 0;
        let mut is_var = false;
        while get_bounds_of_next_potential_var(query, &mut begin, &mut end, &mut is_var) {
            tokens.push(QueryToken::new(query, begin, end, is_var));
        }
        tokens
    }

    #[test]
    fn static_tokens_without_wildcards_are_skipped() {
        // "to" is plain static text: it stays in the inter-token spans
        // and never becomes a query token
        let tokens = tokenize("*connect to host*");
        let values: Vec<&str> = tokens.iter().map(|t| t.value()).collect();
        assert_eq!(values, vec!["*connect", "host*"]);
        assert!(tokens.iter().all(|t| !t.is_var()));
    }

    #[test]
    fn number_token_is_int_var() {
        let tokens = tokenize("*code 404 returned*");
        let t = tokens.iter().find(|t| t.value() == "404").unwrap();
        assert_eq!(t.current_type(), TokenType::IntVar);
        assert!(!t.is_ambiguous_token());
        assert!(t.is_var());
    }

    #[test]
    fn float_token_is_float_var() {
        let tokens = tokenize("*in 1.23 seconds*");
        let t = tokens.iter().find(|t| t.value() == "1.23").unwrap();
        assert_eq!(t.current_type(), TokenType::FloatVar);
    }

    #[test]
    fn ip_token_is_dictionary_var() {
        let tokens = tokenize("*from 10.1.2.3 closed*");
        let t = tokens.iter().find(|t| t.value() == "10.1.2.3").unwrap();
        assert_eq!(t.current_type(), TokenType::DictionaryVar);
    }

    #[test]
    fn wildcarded_number_is_ambiguous() {
        let tokens = tokenize("*abc *123* def*");
        let t = tokens.iter().find(|t| t.value() == "*123*").unwrap();
        assert!(t.is_ambiguous_token());
        assert!(t.has_prefix_greedy_wildcard());
        assert!(t.has_suffix_greedy_wildcard());
        assert!(!t.has_greedy_wildcard_in_middle());
        assert!(!t.cannot_convert_to_non_dict_var());

        // Interpretations: Logtype, IntVar, FloatVar, DictionaryVar
        let mut types = vec![t.current_type()];
        let mut tok = t.clone();
        while tok.change_to_next_possible_type() {
            types.push(tok.current_type());
        }
        assert_eq!(
            types,
            vec![
                TokenType::Logtype,
                TokenType::IntVar,
                TokenType::FloatVar,
                TokenType::DictionaryVar
            ]
        );
    }

    #[test]
    fn middle_wildcard_is_flagged() {
        let tokens = tokenize("*connect*failed*");
        // One token spanning the whole run, wildcard in the middle
        let t = tokens
            .iter()
            .find(|t| t.value().contains("connect"))
            .unwrap();
        assert!(t.has_greedy_wildcard_in_middle());
    }

    #[test]
    fn wildcarded_word_cannot_be_numeric() {
        let tokens = tokenize("*user=ali*e logged*");
        let t = tokens.iter().find(|t| t.value().starts_with("ali")).unwrap();
        assert!(t.is_ambiguous_token());
        assert!(t.cannot_convert_to_non_dict_var());
    }

    #[test]
    fn odometer_wraps() {
        let tokens = tokenize("*x *9* y*");
        let mut t = tokens
            .iter()
            .find(|t| t.value() == "*9*")
            .unwrap()
            .clone();
        let n = {
            let mut count = 1;
            while t.change_to_next_possible_type() {
                count += 1;
            }
            count
        };
        assert_eq!(n, 4);
        // Wrapped back to the first interpretation
        assert_eq!(t.current_type(), TokenType::Logtype);
    }
}
