//! Whitelist enforcement.

use crate::classify::ClassifiedRequest;
use crate::store::WhitelistSet;

/// Exact-match lookup of the request identifier in the set for its kind.
pub fn is_allowed(request: &ClassifiedRequest, whitelist: &WhitelistSet) -> bool {
    whitelist.for_kind(request.kind).contains(&request.identifier)
}
