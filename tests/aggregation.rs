use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};

use club_stats::aggregate::{AggregatedStats, Aggregator, StatsSource};
use club_stats::cancel::CancelFlag;
use club_stats::config::EngineConfig;
use club_stats::model::{MatchPlayerStat, PlayerRecord};
use club_stats::season_key::normalize;
use club_stats::season_summary::build_season_summaries;
use club_stats::store::{Document, DocumentStore, MemoryStore};
use club_stats::{SeasonKey, StatsService};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fixture_store() -> MemoryStore {
    MemoryStore::from_json(&read_fixture("club_store.json")).expect("fixture should load")
}

fn league_a_store() -> MemoryStore {
    let store = MemoryStore::new();
    let put = |path: &str, value: Value| store.insert(path, value).expect("insert");
    put(
        "owner/o/competitions/league-a",
        json!({"name": "League A", "season": "2024-25", "format": "league"}),
    );
    put("owner/o/competitions/league-a/rounds/r1", json!({}));
    put(
        "owner/o/competitions/league-a/rounds/r1/matches/m1",
        json!({"playerStats": [{"playerId": "p1", "minutesPlayed": 90, "goals": 1}]}),
    );
    put(
        "owner/o/competitions/league-a/rounds/r1/matches/m2",
        json!({"playerStats": [{"playerId": "someone-else", "minutesPlayed": 90}]}),
    );
    store
}

fn fixture_player(store: &MemoryStore) -> PlayerRecord {
    let raw = store
        .get("owner/owner-north/teams/t-first/players/p1")
        .unwrap()
        .expect("fixture player document");
    PlayerRecord::from_value("p1", Some("t-first"), &raw)
}

fn record(value: Value) -> PlayerRecord {
    PlayerRecord::from_value("p1", Some("t1"), &value)
}

#[test]
fn match_walk_counts_only_matches_with_the_player() {
    let store = league_a_store();
    let cancel = CancelFlag::new();
    let aggregator = Aggregator::new(&store, "o", "p1", &cancel);
    let player = record(json!({"seasons": ["2023/24", "2024/25"]}));

    let season = normalize("2024/25");
    let stats = aggregator.aggregate(&player, Some(&season)).unwrap();
    assert_eq!(stats.appearances, 1);
    assert_eq!(stats.goals, 1);
    assert_eq!(stats.minutes, 90);

    let other = aggregator
        .aggregate(&player, Some(&normalize("2023/24")))
        .unwrap();
    assert_eq!(other, AggregatedStats::default());
}

#[test]
fn manual_override_fully_replaces_match_data() {
    let store = league_a_store();
    let cancel = CancelFlag::new();
    let aggregator = Aggregator::new(&store, "o", "p1", &cancel);
    let player = record(json!({
        "seasons": ["2024/25"],
        "seasonData": {"2024/25": {"manualCompetitionStats": [
            {"competitionId": "league-a", "matches": 10, "goals": 4, "avgRating": 7.2}
        ]}}
    }));

    let season = normalize("2024-2025");
    let stats = aggregator.aggregate(&player, Some(&season)).unwrap();
    assert_eq!(stats.appearances, 10);
    assert_eq!(stats.goals, 4);
    assert_eq!(stats.minutes, 0, "raw match minutes must not leak in");
    assert_eq!(stats.rating_count, 10);
    assert!((stats.rating_sum() - 72.0).abs() < 1e-9);
    assert!((stats.average_rating().unwrap() - 7.2).abs() < 1e-9);

    let breakdown = aggregator.breakdown(&player, Some(&season)).unwrap();
    assert_eq!(breakdown.len(), 1);
    assert_eq!(breakdown[0].source, StatsSource::Manual);
}

#[test]
fn legacy_root_override_applies_when_season_has_none() {
    let store = league_a_store();
    let cancel = CancelFlag::new();
    let aggregator = Aggregator::new(&store, "o", "p1", &cancel);
    let player = record(json!({
        "manualCompetitionStats": [{"competitionId": "league-a", "matches": 3, "goals": 0}]
    }));
    let stats = aggregator
        .aggregate(&player, Some(&normalize("2024/25")))
        .unwrap();
    assert_eq!(stats.appearances, 3);
    assert_eq!(stats.goals, 0);
}

#[test]
fn accumulation_is_order_independent() {
    let stats: Vec<MatchPlayerStat> = (0..40u32)
        .map(|i| MatchPlayerStat {
            player_id: "p1".into(),
            team_id: None,
            minutes_played: (i * 7) % 91,
            goals: i % 3,
            assists: i % 2,
            yellow_cards: u32::from(i % 5 == 0),
            red_cards: u32::from(i % 17 == 0),
            rating: (i % 4 != 0).then(|| 5.0 + f64::from(i % 9) * 0.35),
            role: None,
        })
        .collect();

    let baseline: AggregatedStats = stats.iter().map(AggregatedStats::from_match).sum();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..25 {
        let mut shuffled = stats.clone();
        shuffled.shuffle(&mut rng);
        let total: AggregatedStats = shuffled.iter().map(AggregatedStats::from_match).sum();
        assert_eq!(total, baseline);
    }
}

#[test]
fn fixture_season_and_career_totals() {
    let store = fixture_store();
    let cancel = CancelFlag::new();
    let aggregator = Aggregator::new(&store, "owner-north", "p1", &cancel);
    let player = fixture_player(&store);

    let season = aggregator
        .aggregate(&player, Some(&normalize("2024/25")))
        .unwrap();
    // League A walk + Cup B manual row; Cup B's raw match is ignored.
    assert_eq!(season.appearances, 11);
    assert_eq!(season.minutes, 90);
    assert_eq!(season.goals, 5);
    assert_eq!(season.rating_count, 11);
    assert!((season.rating_sum() - 79.5).abs() < 1e-9);

    let career = aggregator.aggregate(&player, None).unwrap();
    assert_eq!(career.appearances, 13);
    assert_eq!(career.minutes, 165);
    assert_eq!(career.goals, 6);
    assert_eq!(career.assists, 1);
    assert_eq!(career.yellow_cards, 1);
    assert_eq!(career.rating_count, 11);
}

#[test]
fn summaries_cover_every_registered_season_once() {
    let store = fixture_store();
    let cancel = CancelFlag::new();
    let aggregator = Aggregator::new(&store, "owner-north", "p1", &cancel);
    let player = fixture_player(&store);
    let seasons: Vec<SeasonKey> = ["2024/25", "2023/24", "2021/22", "2024-25"]
        .iter()
        .map(|raw| normalize(raw))
        .collect();

    let summaries = build_season_summaries(&aggregator, &player, &seasons).unwrap();
    let keys: Vec<&str> = summaries.iter().map(|s| s.season.as_str()).collect();
    assert_eq!(keys, vec!["2024/25", "2023/24", "2021/22"]);

    let empty = &summaries[2];
    assert_eq!(empty.total, AggregatedStats::default());
    assert!(empty.competitions.is_empty());

    let latest = &summaries[0];
    let names: Vec<&str> = latest.competitions.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Cup B", "League A"]);
    assert_eq!(latest.total.goals, 5);
    assert_eq!(latest.overall, Some(69.0));
    assert_eq!(latest.competitions[0].source, StatsSource::Manual);
}

/// Store whose round listing fails for one competition.
struct FlakyStore {
    inner: MemoryStore,
    failing_prefix: String,
}

impl DocumentStore for FlakyStore {
    fn get(&self, path: &str) -> Result<Option<Value>> {
        self.inner.get(path)
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>> {
        if collection.starts_with(&self.failing_prefix) {
            return Err(anyhow!("deadline exceeded listing {collection}"));
        }
        self.inner.list(collection)
    }

    fn merge(&self, path: &str, data: Value) -> Result<()> {
        self.inner.merge(path, data)
    }
}

#[test]
fn failing_branch_degrades_to_zero_instead_of_failing() {
    let store = FlakyStore {
        inner: fixture_store(),
        failing_prefix: "owner/owner-north/competitions/league-a/rounds".to_string(),
    };
    let service = StatsService::with_config(Arc::new(store), &EngineConfig::default());
    let computed = service
        .compute("owner-north", "p1", None, true, &CancelFlag::new())
        .unwrap();

    let season = computed.season_stats.unwrap();
    // Only Cup B's manual row remains for 2024/25.
    assert_eq!(season.appearances, 10);
    assert_eq!(season.minutes, 0);
    assert!(!computed.degraded.is_empty());
    assert_eq!(computed.season_summaries.unwrap().len(), 2);
}
