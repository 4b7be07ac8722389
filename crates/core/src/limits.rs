//! Fixed ceilings for dictionary IDs.
//!
//! The variable-dictionary ceiling follows from the encoded-variable slot
//! layout: a dictionary variable packs its ID into the low 40 bits of the
//! slot, so IDs above `2^40 - 1` cannot be represented. The logtype
//! ceiling is conventional headroom; logtype IDs travel in their own
//! column and are not packed.
//!
//! These are the defaults handed to `Dictionary::open`; callers may pass
//! smaller ceilings (tests do) but never larger ones for the variable
//! dictionary.

/// Highest variable-dictionary ID representable in an encoded slot.
pub const VARIABLE_DICT_ID_MAX: u64 = (1 << 40) - 1;

/// Highest logtype-dictionary ID the archive will assign.
pub const LOGTYPE_DICT_ID_MAX: u64 = (1 << 62) - 1;
