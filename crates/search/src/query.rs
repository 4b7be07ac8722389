//! Query and subquery structures.
//!
//! A `Query` holds the cleaned search string, the time range, and one
//! `SubQuery` per surviving interpretation of the search string's
//! ambiguous tokens. Each subquery is a concrete, conservative
//! predicate: candidate logtypes, ordered variable constraints, and the
//! set of segments that could possibly hold a match (the intersection of
//! the segment sets of its logtypes and dictionary variables).
//!
//! Subquery matching never rejects a truly matching message; the final
//! wildcard verification rejects the false positives it admits.

use std::collections::{BTreeSet, HashSet};

use logcask_codec::decode_dict_var_slot;
use logcask_core::{Epoch, LogtypeId, SegmentId, VariableId, EPOCH_MAX, EPOCH_MIN};

/// One variable constraint within a subquery.
#[derive(Debug, Clone)]
pub enum QueryVar {
    /// An exactly encoded numeric variable (integer or float slot).
    ExactNumeric { encoded: i64 },
    /// An exact dictionary variable.
    ExactDict {
        var_id: VariableId,
        segments: BTreeSet<SegmentId>,
    },
    /// A wildcard dictionary variable: any of the matching entries.
    WildcardDict {
        var_ids: BTreeSet<VariableId>,
        segments: BTreeSet<SegmentId>,
    },
}

impl QueryVar {
    /// Whether `encoded_var` could satisfy this constraint. Dictionary
    /// slots are compared by ID (the segment hint is advisory).
    pub fn matches(&self, encoded_var: i64) -> bool {
        match self {
            QueryVar::ExactNumeric { encoded } => encoded_var == *encoded,
            QueryVar::ExactDict { var_id, .. } => {
                decode_dict_var_slot(encoded_var).0 == *var_id
            }
            QueryVar::WildcardDict { var_ids, .. } => {
                var_ids.contains(&decode_dict_var_slot(encoded_var).0)
            }
        }
    }

    /// Segment set backing this constraint, when dictionary-backed.
    pub fn segments(&self) -> Option<&BTreeSet<SegmentId>> {
        match self {
            QueryVar::ExactNumeric { .. } => None,
            QueryVar::ExactDict { segments, .. } | QueryVar::WildcardDict { segments, .. } => {
                Some(segments)
            }
        }
    }
}

/// One interpretation of the search string.
#[derive(Debug, Clone, Default)]
pub struct SubQuery {
    possible_logtype_ids: HashSet<LogtypeId>,
    /// Union of the candidate logtypes' segment sets.
    logtype_segments: BTreeSet<SegmentId>,
    vars: Vec<QueryVar>,
    wildcard_match_required: bool,
    ids_of_matching_segments: BTreeSet<SegmentId>,
}

impl SubQuery {
    pub fn clear(&mut self) {
        *self = SubQuery::default();
    }

    pub fn mark_wildcard_match_required(&mut self) {
        self.wildcard_match_required = true;
    }

    pub fn wildcard_match_required(&self) -> bool {
        self.wildcard_match_required
    }

    pub fn add_var(&mut self, var: QueryVar) {
        self.vars.push(var);
    }

    pub fn vars(&self) -> &[QueryVar] {
        &self.vars
    }

    pub fn set_possible_logtypes(
        &mut self,
        ids: HashSet<LogtypeId>,
        segments: BTreeSet<SegmentId>,
    ) {
        self.possible_logtype_ids = ids;
        self.logtype_segments = segments;
    }

    pub fn possible_logtype_ids(&self) -> &HashSet<LogtypeId> {
        &self.possible_logtype_ids
    }

    /// Intersects the logtype segment set with each dictionary-backed
    /// variable's segment set.
    pub fn calculate_ids_of_matching_segments(&mut self) {
        let mut result = self.logtype_segments.clone();
        for var in &self.vars {
            if let Some(segments) = var.segments() {
                result = result.intersection(segments).copied().collect();
            }
        }
        self.ids_of_matching_segments = result;
    }

    pub fn ids_of_matching_segments(&self) -> &BTreeSet<SegmentId> {
        &self.ids_of_matching_segments
    }

    pub fn matches_segment(&self, segment_id: SegmentId) -> bool {
        self.ids_of_matching_segments.contains(&segment_id)
    }

    pub fn matches_logtype(&self, logtype_id: LogtypeId) -> bool {
        self.possible_logtype_ids.contains(&logtype_id)
    }

    /// Whether the message's encoded variables satisfy this subquery's
    /// constraints as an ordered subsequence.
    pub fn matches_vars(&self, encoded_vars: &[i64]) -> bool {
        if self.vars.len() > encoded_vars.len() {
            return false;
        }
        let mut pending = self.vars.iter();
        let mut current = pending.next();
        for &var in encoded_vars {
            match current {
                Some(query_var) if query_var.matches(var) => current = pending.next(),
                Some(_) => {}
                None => break,
            }
        }
        current.is_none()
    }
}

/// A processed wildcard query.
#[derive(Debug, Clone)]
pub struct Query {
    search_string: String,
    search_begin_ts: Epoch,
    search_end_ts: Epoch,
    ignore_case: bool,
    sub_queries: Vec<SubQuery>,
}

impl Query {
    pub fn new(
        search_string: String,
        search_begin_ts: Epoch,
        search_end_ts: Epoch,
        ignore_case: bool,
    ) -> Self {
        Query {
            search_string,
            search_begin_ts,
            search_end_ts,
            ignore_case,
            sub_queries: Vec::new(),
        }
    }

    pub fn search_string(&self) -> &str {
        &self.search_string
    }

    pub fn search_begin_ts(&self) -> Epoch {
        self.search_begin_ts
    }

    pub fn search_end_ts(&self) -> Epoch {
        self.search_end_ts
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Whether the search string is the trivial match-all `*`.
    pub fn search_string_matches_all(&self) -> bool {
        self.search_string == "*"
    }

    /// Whether the query restricts the timestamp range at all.
    pub fn has_time_range(&self) -> bool {
        self.search_begin_ts > EPOCH_MIN || self.search_end_ts < EPOCH_MAX
    }

    pub fn add_sub_query(&mut self, sub_query: SubQuery) {
        self.sub_queries.push(sub_query);
    }

    pub fn clear_sub_queries(&mut self) {
        self.sub_queries.clear();
    }

    pub fn contains_sub_queries(&self) -> bool {
        !self.sub_queries.is_empty()
    }

    pub fn sub_queries(&self) -> &[SubQuery] {
        &self.sub_queries
    }

    /// The subqueries whose segment sets admit `segment_id`.
    pub fn relevant_sub_queries(&self, segment_id: SegmentId) -> Vec<&SubQuery> {
        self.sub_queries
            .iter()
            .filter(|sq| sq.matches_segment(segment_id))
            .collect()
    }

    /// Union of all subqueries' matching segments.
    pub fn ids_of_matching_segments(&self) -> BTreeSet<SegmentId> {
        self.sub_queries
            .iter()
            .flat_map(|sq| sq.ids_of_matching_segments().iter().copied())
            .collect()
    }

    pub fn timestamp_is_in_search_time_range(&self, ts: Epoch) -> bool {
        ts >= self.search_begin_ts && ts <= self.search_end_ts
    }
}
