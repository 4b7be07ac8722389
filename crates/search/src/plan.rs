//! Query planning: from a raw wildcard string to a `Query` with
//! concrete subqueries.
//!
//! Processing steps:
//!
//! 1. Surround the user string with `*…*` (substring semantics) and
//!    clean it; this cleaned form is what the final verification
//!    matches against, `?` semantics intact.
//! 2. Degrade non-greedy wildcards to greedy (`?` → `*`) for the
//!    heuristic backend and re-clean.
//! 3. Tokenize and enumerate one subquery per combination of ambiguous
//!    token interpretations.
//! 4. For each subquery, build a wildcard template over logtype bytes
//!    and keep it only if the logtype dictionary has matching entries;
//!    a template that collapses to `*` supersedes every other subquery.
//! 5. Resolve exact and wildcard dictionary variables against the
//!    variable dictionary, then intersect segment sets.

use std::collections::{BTreeSet, HashSet};

use logcask_archive::{DictionaryReader, LogtypeEntry, VariableEntry};
use logcask_codec::{
    encode_float_token, encode_integer_token, is_variable_placeholder, PLACEHOLDER_DICTIONARY,
    PLACEHOLDER_FLOAT, PLACEHOLDER_INTEGER,
};
use logcask_core::wildcard::clean_wildcard_string;
use logcask_core::Epoch;
use tracing::debug;

use crate::query::{Query, QueryVar, SubQuery};
use crate::token::{get_bounds_of_next_potential_var, QueryToken, TokenType};

enum Matchability {
    MayMatch(SubQuery),
    WontMatch,
    SupercedesAllSubQueries,
}

/// Processes a raw search string against an archive's dictionaries.
/// Returns `None` when no message in the archive can possibly match.
pub fn process_raw_query(
    logtype_dict: &DictionaryReader<LogtypeEntry>,
    var_dict: &DictionaryReader<VariableEntry>,
    search_string: &str,
    search_begin_ts: Epoch,
    search_end_ts: Epoch,
    ignore_case: bool,
) -> Option<Query> {
    // Substring semantics, then clean
    let mut surrounded = String::with_capacity(search_string.len() + 2);
    surrounded.push('*');
    surrounded.push_str(search_string);
    surrounded.push('*');
    let processed = clean_wildcard_string(&surrounded);

    let mut query = Query::new(
        processed.clone(),
        search_begin_ts,
        search_end_ts,
        ignore_case,
    );

    // The heuristic backend has no non-greedy wildcard support
    let heuristic = clean_wildcard_string(&replace_unescaped_question_marks(&processed));

    let mut tokens = Vec::new();
    let mut begin_pos = 0usize;
    let mut end_pos = 0usize;
    let mut is_var = false;
    while get_bounds_of_next_potential_var(&heuristic, &mut begin_pos, &mut end_pos, &mut is_var) {
        tokens.push(QueryToken::new(&heuristic, begin_pos, end_pos, is_var));
    }

    // Ambiguous tokens drive the interpretation odometer; greedy-middle
    // tokens are excluded (they fall back to decompression + wildcard
    // matching)
    let ambiguous_ixs: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.has_greedy_wildcard_in_middle() && t.is_ambiguous_token())
        .map(|(ix, _)| ix)
        .collect();

    loop {
        match generate_sub_query(logtype_dict, var_dict, &heuristic, &tokens, ignore_case) {
            Matchability::SupercedesAllSubQueries => {
                query.clear_sub_queries();
                debug!(search_string = %query.search_string(), "query matches all logtypes");
                return Some(query);
            }
            Matchability::MayMatch(sub_query) => query.add_sub_query(sub_query),
            Matchability::WontMatch => {}
        }

        let mut advanced = false;
        for &ix in &ambiguous_ixs {
            if tokens[ix].change_to_next_possible_type() {
                advanced = true;
                break;
            }
        }
        if !advanced {
            break;
        }
    }

    debug!(
        search_string = %query.search_string(),
        num_sub_queries = query.sub_queries().len(),
        "query processed"
    );
    if query.contains_sub_queries() {
        Some(query)
    } else {
        None
    }
}

/// Replaces unescaped `?` with `*`.
fn replace_unescaped_question_marks(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            out.push(c);
            escaped = true;
        } else if c == '?' {
            out.push('*');
        } else {
            out.push(c);
        }
    }
    out
}

/// Appends query text to a logtype wildcard template.
///
/// Stored logtypes escape-prefix literal placeholder and escape bytes,
/// so the template must double up: a literal placeholder byte becomes
/// `\\` (matching the stored escape) plus the byte; a literal backslash
/// becomes two escaped backslashes. Wildcards and escaped wildcards pass
/// through untouched.
fn append_query_constant_to_template(text: &[u8], template: &mut Vec<u8>) {
    let mut i = 0usize;
    while i < text.len() {
        let b = text[i];
        if b == b'\\' && i + 1 < text.len() {
            let next = text[i + 1];
            if next == b'\\' {
                // Literal backslash: stored as escape + backslash
                template.extend_from_slice(&[b'\\', b'\\', b'\\', b'\\']);
            } else {
                // Escaped wildcard stays escaped
                template.push(b'\\');
                template.push(next);
            }
            i += 2;
        } else if is_variable_placeholder(b) {
            // Literal placeholder byte: stored as escape + byte
            template.extend_from_slice(&[b'\\', b'\\']);
            template.push(b);
            i += 1;
        } else {
            template.push(b);
            i += 1;
        }
    }
}

fn generate_sub_query(
    logtype_dict: &DictionaryReader<LogtypeEntry>,
    var_dict: &DictionaryReader<VariableEntry>,
    processed: &str,
    tokens: &[QueryToken],
    ignore_case: bool,
) -> Matchability {
    let bytes = processed.as_bytes();
    let mut sub_query = SubQuery::default();
    let mut template: Vec<u8> = Vec::with_capacity(processed.len());
    let mut last_token_end = 0usize;

    for token in tokens {
        append_query_constant_to_template(&bytes[last_token_end..token.begin_pos()], &mut template);
        last_token_end = token.end_pos();

        if token.is_wildcard() {
            template.push(b'*');
        } else if token.has_greedy_wildcard_in_middle() {
            // Pieces on either side of the middle wildcard would each
            // need ambiguous-token treatment; fall back to decompression
            // plus wildcard matching
            sub_query.mark_wildcard_match_required();
            template.push(b'*');
            if token.flagged_as_var() {
                template.push(PLACEHOLDER_DICTIONARY);
                template.push(b'*');
            }
        } else if !token.is_var() {
            append_query_constant_to_template(token.value().as_bytes(), &mut template);
        } else if !process_var_token(token, var_dict, ignore_case, &mut sub_query, &mut template) {
            return Matchability::WontMatch;
        }
    }
    append_query_constant_to_template(&bytes[last_token_end..], &mut template);

    if template == b"*" {
        return Matchability::SupercedesAllSubQueries;
    }

    let entries = logtype_dict.entries_matching_wildcard(&template, ignore_case);
    if entries.is_empty() {
        return Matchability::WontMatch;
    }
    let mut ids = HashSet::with_capacity(entries.len());
    let mut segments = BTreeSet::new();
    for entry in entries {
        ids.insert(entry.id);
        if let Some(entry_segments) = logtype_dict.segments_of(entry.id) {
            segments.extend(entry_segments.iter().copied());
        }
    }
    sub_query.set_possible_logtypes(ids, segments);
    sub_query.calculate_ids_of_matching_segments();
    Matchability::MayMatch(sub_query)
}

/// Handles a token interpreted as a variable. Returns `false` when the
/// interpretation cannot match anything in this archive.
fn process_var_token(
    token: &QueryToken,
    var_dict: &DictionaryReader<VariableEntry>,
    ignore_case: bool,
    sub_query: &mut SubQuery,
    template: &mut Vec<u8>,
) -> bool {
    // Even a precise variable needs the final wildcard match to confirm
    // it sits in the right place in the message
    sub_query.mark_wildcard_match_required();

    if !token.contains_wildcards() {
        if let Some(encoded) = encode_integer_token(token.value()) {
            template.push(PLACEHOLDER_INTEGER);
            sub_query.add_var(QueryVar::ExactNumeric { encoded });
        } else if let Some(encoded) = encode_float_token(token.value()) {
            template.push(PLACEHOLDER_FLOAT);
            sub_query.add_var(QueryVar::ExactNumeric { encoded });
        } else {
            let Some(entry) = var_dict.get_by_value(token.value().as_bytes()) else {
                // Variable doesn't exist in the dictionary
                return false;
            };
            template.push(PLACEHOLDER_DICTIONARY);
            let segments = var_dict
                .segments_of(entry.id)
                .cloned()
                .unwrap_or_default();
            sub_query.add_var(QueryVar::ExactDict {
                var_id: entry.id,
                segments,
            });
        }
        return true;
    }

    if token.has_prefix_greedy_wildcard() {
        template.push(b'*');
    }
    match token.current_type() {
        TokenType::IntVar => template.push(PLACEHOLDER_INTEGER),
        TokenType::FloatVar => template.push(PLACEHOLDER_FLOAT),
        _ => {
            template.push(PLACEHOLDER_DICTIONARY);
            if token.cannot_convert_to_non_dict_var() {
                // Must be a dictionary variable: constrain by the
                // matching entries
                let entries =
                    var_dict.entries_matching_wildcard(token.value().as_bytes(), ignore_case);
                if entries.is_empty() {
                    return false;
                }
                let mut var_ids = BTreeSet::new();
                let mut segments = BTreeSet::new();
                for entry in entries {
                    var_ids.insert(entry.id);
                    if let Some(entry_segments) = var_dict.segments_of(entry.id) {
                        segments.extend(entry_segments.iter().copied());
                    }
                }
                sub_query.add_var(QueryVar::WildcardDict { var_ids, segments });
            }
        }
    }
    if token.has_suffix_greedy_wildcard() {
        template.push(b'*');
    }
    true
}
