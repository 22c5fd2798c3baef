use log::debug;

use crate::error::{EngineError, EngineResult};
use crate::model::ClubProfile;
use crate::store::{Document, DocumentStore, paths};

/// Resolve a public club id (or an owner scope id) to its profile.
///
/// Tried in order: document id, `clubId` field, `ownerUid` field.
pub fn resolve_club(store: &dyn DocumentStore, club_id: &str) -> EngineResult<ClubProfile> {
    let club_id = club_id.trim();
    if club_id.is_empty() {
        return Err(EngineError::ClubNotFound(club_id.to_string()));
    }

    if let Some(data) = store.get(&paths::club_profile(club_id))? {
        let doc = Document {
            id: club_id.to_string(),
            path: paths::club_profile(club_id),
            data,
        };
        if let Some(profile) = ClubProfile::from_document(&doc) {
            debug!("club {club_id} resolved by document id");
            return Ok(profile);
        }
    }

    let wanted = [club_id.to_string()];
    for field in ["clubId", "ownerUid"] {
        let hits = store.query_in(paths::CLUB_PROFILES, field, &wanted)?;
        if let Some(profile) = first_profile(hits) {
            debug!("club {club_id} resolved by {field}");
            return Ok(profile);
        }
    }

    Err(EngineError::ClubNotFound(club_id.to_string()))
}

// Store order is unspecified; pick the lowest document id so repeated
// lookups agree.
fn first_profile(mut hits: Vec<Document>) -> Option<ClubProfile> {
    hits.sort_by(|a, b| a.id.cmp(&b.id));
    hits.iter().find_map(ClubProfile::from_document)
}
