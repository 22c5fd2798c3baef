use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use club_stats::cancel::CancelFlag;
use club_stats::model::PlayerRecord;
use club_stats::player_record::PlayerRecordResolver;
use club_stats::roster::{RosterResolver, registered_seasons};
use club_stats::season_key::normalize;
use club_stats::store::MemoryStore;
use club_stats::{EngineError, SeasonKey};

const SCOPE: &str = "owner-1";

fn base_store() -> MemoryStore {
    let store = MemoryStore::new();
    for (path, value) in [
        ("owner/owner-1/seasons/2023-24", json!({})),
        ("owner/owner-1/seasons/2024-25", json!({})),
        (
            "owner/owner-1/seasons/2023-24/roster/p9",
            json!({"teamId": "t-reserves"}),
        ),
        (
            "owner/owner-1/seasons/2024-25/roster/p9",
            json!({"teamId": "t-first", "position": "CB", "shirtNumber": 4, "name": ""}),
        ),
    ] {
        store.insert(path, value).expect("insert");
    }
    store
}

fn put_player(store: &MemoryStore, team: &str, data: Value) {
    store.insert(&format!("owner/owner-1/teams/{team}"), json!({})).expect("team");
    store
        .insert(&format!("owner/owner-1/teams/{team}/players/p9"), data)
        .expect("player");
}

fn resolve(store: MemoryStore) -> Result<club_stats::player_record::ResolvedPlayer, EngineError> {
    let store = Arc::new(store);
    let roster = RosterResolver::new(store.clone(), Duration::from_secs(60));
    let resolver = PlayerRecordResolver::new(store);
    resolver.resolve(&roster, SCOPE, "p9", &CancelFlag::new())
}

fn rich_document() -> Value {
    json!({
        "name": "Bea Keeper",
        "teamId": "t-first",
        "seasonData": {"2024/25": {"params": {"pace": 60, "defending": 82}}}
    })
}

#[test]
fn richer_document_with_roster_team_wins_in_either_order() {
    // Neither document sits under the latest roster team, so both go
    // through scoring; team ids sort the listing into opposite orders.
    for (name_only_team, rich_team) in [("a-archive", "z-archive"), ("z-archive", "a-archive")] {
        let store = base_store();
        put_player(&store, name_only_team, json!({"name": "Bea Keeper"}));
        put_player(&store, rich_team, rich_document());

        let resolved = resolve(store).expect("player should resolve");
        assert_eq!(resolved.source_team, rich_team);
        assert!(resolved.record.has_season_params());
    }
}

#[test]
fn latest_roster_team_document_is_taken_directly() {
    let store = base_store();
    put_player(&store, "t-first", json!({"name": "Bea Keeper"}));
    put_player(&store, "t-reserves", rich_document());

    let resolved = resolve(store).unwrap();
    assert_eq!(resolved.source_team, "t-first");
    assert_eq!(
        resolved.latest_roster.as_ref().map(|e| e.season_id.as_str()),
        Some("2024/25")
    );
    assert_eq!(resolved.roster_hits.len(), 2);
}

#[test]
fn older_roster_team_scores_above_unrelated_team() {
    let store = base_store();
    put_player(&store, "t-unrelated", json!({"name": "Bea", "seasons": ["2024/25"]}));
    put_player(&store, "t-reserves", json!({"name": "Bea"}));

    let resolved = resolve(store).unwrap();
    assert_eq!(resolved.source_team, "t-reserves");
}

#[test]
fn roster_fields_fill_profile_but_skip_empty_values() {
    let store = base_store();
    put_player(
        &store,
        "t-first",
        json!({"name": "Bea Keeper", "position": "GK", "preferredFoot": "left"}),
    );

    let record = resolve(store).unwrap().record;
    assert_eq!(record.position.as_deref(), Some("CB"));
    assert_eq!(record.name.as_deref(), Some("Bea Keeper"));
    assert_eq!(record.extra.get("shirtNumber"), Some(&json!(4)));
    assert_eq!(record.physical.preferred_foot.as_deref(), Some("left"));
    assert!(record.extra.get("seasonId").is_none());
}

#[test]
fn unknown_player_is_not_found() {
    let store = base_store();
    put_player(&store, "t-first", json!({"name": "Bea"}));
    let store = Arc::new(store);
    let roster = RosterResolver::new(store.clone(), Duration::from_secs(60));
    let resolver = PlayerRecordResolver::new(store);

    let err = resolver
        .resolve(&roster, SCOPE, "ghost", &CancelFlag::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::PlayerNotFound { .. }));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn registered_seasons_are_limited_to_the_registry() {
    let record = PlayerRecord::from_value(
        "p9",
        None,
        &json!({"seasons": ["2024/25", "2023/24", "2022/23"]}),
    );
    let registry = ["2024-25", "2023/2024"].iter().map(|raw| normalize(raw)).collect();

    let seasons = registered_seasons(&[], &record, &registry);
    assert_eq!(
        seasons,
        vec![SeasonKey::from("2024/25"), SeasonKey::from("2023/24")]
    );
}
