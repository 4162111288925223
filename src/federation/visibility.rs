//! Mapping between post visibility and protocol addressing
//!
//! Followers-only cannot be inferred from inbound addressing: the followers
//! collection IRI is instance-specific and is not inspected, so such notes
//! come back as `Private`.

use crate::data::Visibility;

use super::vocab::PUBLIC_COLLECTION;

/// Build `(to, cc)` for a local post
pub fn to_addressing(visibility: Visibility, base_url: &str) -> (Vec<String>, Vec<String>) {
    let base_url = base_url.trim_end_matches('/');
    match visibility {
        Visibility::Public => (vec![PUBLIC_COLLECTION.to_string()], Vec::new()),
        Visibility::FollowersOnly => (Vec::new(), vec![format!("{}/followers", base_url)]),
        Visibility::Unlisted => (Vec::new(), vec![PUBLIC_COLLECTION.to_string()]),
        Visibility::Private => (vec![format!("{}/profile", base_url)], Vec::new()),
    }
}

/// Infer visibility from inbound `to`/`cc`
pub fn from_addressing(to: &[String], cc: &[String]) -> Visibility {
    let is_public = |iri: &String| iri == PUBLIC_COLLECTION || iri == "as:Public" || iri == "Public";

    if to.iter().any(is_public) {
        Visibility::Public
    } else if cc.iter().any(is_public) {
        Visibility::Unlisted
    } else {
        Visibility::Private
    }
}
