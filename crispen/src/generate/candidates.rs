//! Size fallback sequencing
//!
//! `auto` preserves the input aspect ratio but is not accepted by every model
//! revision, so it is always followed by a fixed square fallback.

use tracing::debug;

use crate::api::SizeToken;

/// One size variant of the request, with its position in the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCandidate {
    pub size: SizeToken,
    pub ordinal: usize,
}

/// Ordered candidates for a size preference
///
/// `auto` yields `[auto, fallback]`; any fixed preference yields just itself.
pub fn size_candidates(preference: SizeToken, fallback: SizeToken) -> Vec<SizeCandidate> {
    debug!(%preference, %fallback, "size_candidates: called");
    let sizes = if preference.is_auto() {
        vec![SizeToken::Auto, fallback]
    } else {
        vec![preference]
    };

    sizes
        .into_iter()
        .enumerate()
        .map(|(ordinal, size)| SizeCandidate { size, ordinal })
        .collect()
}
