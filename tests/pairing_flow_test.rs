//! Integration tests for the pairing lifecycle against a file-backed store.
//!
//! These tests verify codes are single-use under concurrency and that the
//! snapshot on disk always reflects committed state.

use ivathy::pairing::CodeSource;
use ivathy::{PairState, PairingError, PairingManager, PartnerSummary, Store};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

/// Hands out a fixed sequence of codes.
#[derive(Debug)]
struct ScriptedCodes(Mutex<VecDeque<String>>);

impl ScriptedCodes {
    fn new(codes: &[&str]) -> Self {
        Self(Mutex::new(codes.iter().map(|c| c.to_string()).collect()))
    }
}

impl CodeSource for ScriptedCodes {
    fn next_code(&self) -> String {
        self.0.lock().unwrap().pop_front().expect("script exhausted")
    }
}

fn open_store(dir: &TempDir) -> Arc<Store> {
    Arc::new(Store::open(dir.path().join("data").join("db.json")).unwrap())
}

#[test]
fn ana_and_luis_pair_with_shared_code() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let manager =
        PairingManager::new(Arc::clone(&store)).with_code_source(ScriptedCodes::new(&["AB12C9"]));

    let ana = store.create_user("ana-id", "Ana").unwrap();
    let luis = store.create_user("luis-id", "Luis").unwrap();

    assert_eq!(manager.generate_code(&ana.id).unwrap(), "AB12C9");

    let partner = manager.join_with_code("AB12C9", &luis.id).unwrap();
    assert_eq!(
        partner,
        PartnerSummary {
            id: ana.id.clone(),
            name: "Ana".to_string()
        }
    );
    assert_eq!(
        manager.check_pair_status(&ana.id),
        Some(PartnerSummary {
            id: luis.id.clone(),
            name: "Luis".to_string()
        })
    );

    // Joining again with the consumed code fails
    store.create_user("carla-id", "Carla").unwrap();
    assert!(matches!(
        manager.join_with_code("AB12C9", "carla-id"),
        Err(PairingError::InvalidCode(_))
    ));
}

#[test]
fn committed_pairing_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir);
        let manager = PairingManager::new(Arc::clone(&store))
            .with_code_source(ScriptedCodes::new(&["K9K9K9"]));
        store.create_user("a", "Ana").unwrap();
        store.create_user("b", "Luis").unwrap();
        manager.generate_code("a").unwrap();
        manager.join_with_code("K9K9K9", "b").unwrap();
    }

    let store = open_store(&dir);
    let manager = PairingManager::new(Arc::clone(&store));
    assert_eq!(manager.pair_state("a"), Some(PairState::Paired));
    assert_eq!(manager.check_pair_status("b").map(|p| p.id), Some("a".to_string()));
    assert_eq!(store.user_by_pair_code("K9K9K9"), None);
    assert_eq!(store.stats().couples, 1);
}

#[test]
fn outstanding_code_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir);
        let manager = PairingManager::new(Arc::clone(&store))
            .with_code_source(ScriptedCodes::new(&["WAIT01"]));
        store.create_user("a", "Ana").unwrap();
        manager.generate_code("a").unwrap();
    }

    let store = open_store(&dir);
    store.create_user("b", "Luis").unwrap();
    let manager = PairingManager::new(Arc::clone(&store));
    assert_eq!(manager.pair_state("a"), Some(PairState::CodeIssued));
    assert_eq!(manager.join_with_code("wait01", "b").unwrap().id, "a");
}

#[test]
fn racing_joins_on_one_code_commit_at_most_once() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let manager = Arc::new(
        PairingManager::new(Arc::clone(&store)).with_code_source(ScriptedCodes::new(&["RACE42"])),
    );

    store.create_user("issuer", "Ana").unwrap();
    let joiners: Vec<String> = (0..8).map(|i| format!("joiner-{i}")).collect();
    for id in &joiners {
        store.create_user(id, "Joiner").unwrap();
    }
    manager.generate_code("issuer").unwrap();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = joiners
            .iter()
            .map(|id| {
                let manager = Arc::clone(&manager);
                scope.spawn(move || manager.join_with_code("RACE42", id))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, PairingError::InvalidCode(_))));

    let paired_joiners = joiners
        .iter()
        .filter(|id| store.get_user(id).unwrap().partner_id.is_some())
        .count();
    assert_eq!(paired_joiners, 1);
    assert_eq!(store.stats().couples, 1);

    // Disk agrees with memory
    let reopened = open_store(&dir);
    assert_eq!(reopened.stats(), store.stats());
}

#[test]
fn joins_through_separate_stores_commit_at_most_once() {
    let dir = TempDir::new().unwrap();
    let setup = open_store(&dir);
    let issuer =
        PairingManager::new(Arc::clone(&setup)).with_code_source(ScriptedCodes::new(&["SHARED"]));
    setup.create_user("issuer", "Ana").unwrap();
    let joiners: Vec<String> = (0..6).map(|i| format!("joiner-{i}")).collect();
    for id in &joiners {
        setup.create_user(id, "Joiner").unwrap();
    }
    issuer.generate_code("issuer").unwrap();

    // Each joiner gets its own store on the same file, like separate CLI runs.
    let managers: Vec<PairingManager> = joiners
        .iter()
        .map(|_| PairingManager::new(open_store(&dir)))
        .collect();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = managers
            .iter()
            .zip(&joiners)
            .map(|(manager, id)| scope.spawn(move || manager.join_with_code("SHARED", id)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, PairingError::InvalidCode(_))));

    let reopened = open_store(&dir);
    assert_eq!(reopened.stats().couples, 1);
    assert_eq!(reopened.stats().pair_codes, 0);
    let partner = reopened.get_user("issuer").unwrap().partner_id.unwrap();
    assert_eq!(
        reopened.get_user(&partner).unwrap().partner_id.as_deref(),
        Some("issuer")
    );
}

#[test]
fn concurrent_user_creation_loses_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    thread::scope(|scope| {
        for i in 0..16 {
            let store = Arc::clone(&store);
            scope.spawn(move || store.create_user(&format!("user-{i}"), "Someone").unwrap());
        }
    });

    assert_eq!(open_store(&dir).stats().users, 16);
}

#[test]
fn joining_revokes_the_joiners_own_code() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let manager = PairingManager::new(Arc::clone(&store))
        .with_code_source(ScriptedCodes::new(&["AAAAA1", "BBBBB2"]));
    store.create_user("a", "Ana").unwrap();
    store.create_user("b", "Luis").unwrap();
    store.create_user("c", "Carla").unwrap();

    manager.generate_code("a").unwrap();
    manager.generate_code("b").unwrap();
    manager.join_with_code("AAAAA1", "b").unwrap();

    assert_eq!(store.user_by_pair_code("BBBBB2"), None);
    assert!(matches!(
        manager.join_with_code("BBBBB2", "c"),
        Err(PairingError::InvalidCode(_))
    ));
    assert_eq!(manager.pair_state("c"), Some(PairState::Unpaired));
}
