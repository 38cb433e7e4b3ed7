//! # Key Filter Scan Tests
//!
//! These tests verify the selected/traverse contract against ordered
//! stores: scanning with the navigation oracle must visit exactly the
//! keys a linear `selected` scan would, in order, in both directions,
//! and must terminate.

use std::collections::BTreeSet;
use std::ops::Bound;

use larchdb::{Key, KeyFilter, KeyState, Segment, Term};

/// Forward scan protocol: seek strictly greater, select or traverse.
fn scan_forward(store: &BTreeSet<KeyState>, filter: &KeyFilter) -> Vec<KeyState> {
    let mut visited = Vec::new();
    let mut key = Key::before();
    let mut probes = 0usize;
    loop {
        probes += 1;
        assert!(probes < 10_000, "scan failed to terminate");
        let Some(next) = store
            .range((Bound::Excluded(key.state()), Bound::Unbounded))
            .next()
        else {
            break;
        };
        key = next.to_key();
        if filter.selected(&key) {
            visited.push(key.state());
        } else if !filter.traverse(&mut key, true) {
            break;
        }
    }
    visited
}

/// Backward scan protocol: seek strictly less, select or traverse.
fn scan_backward(store: &BTreeSet<KeyState>, filter: &KeyFilter) -> Vec<KeyState> {
    let mut visited = Vec::new();
    let mut key = Key::after();
    let mut probes = 0usize;
    loop {
        probes += 1;
        assert!(probes < 10_000, "scan failed to terminate");
        let Some(next) = store
            .range((Bound::Unbounded, Bound::Excluded(key.state())))
            .next_back()
        else {
            break;
        };
        key = next.to_key();
        if filter.selected(&key) {
            visited.push(key.state());
        } else if !filter.traverse(&mut key, false) {
            break;
        }
    }
    visited
}

/// Oracle: linear scan applying `selected` to every stored key.
fn linear(store: &BTreeSet<KeyState>, filter: &KeyFilter) -> Vec<KeyState> {
    store
        .iter()
        .filter(|ks| filter.selected(&ks.to_key()))
        .cloned()
        .collect()
}

fn assert_scan_matches_linear(store: &BTreeSet<KeyState>, filter: &KeyFilter) {
    let expected = linear(store, filter);
    assert_eq!(scan_forward(store, filter), expected, "forward scan");
    let mut reversed = expected;
    reversed.reverse();
    assert_eq!(scan_backward(store, filter), reversed, "backward scan");
}

fn int_key(v: i64) -> KeyState {
    Key::new().append(v).state()
}

#[test]
fn or_filter_over_integers_forward_and_backward() {
    let store: BTreeSet<KeyState> = (0..100).map(int_key).collect();
    let filter = KeyFilter::new().append(
        Term::or(vec![
            Term::range_with(Some(10.into()), Some(20.into()), true, false),
            Term::range_with(Some(50.into()), Some(60.into()), true, false),
            Term::range_with(Some(80.into()), Some(90.into()), false, true),
        ])
        .unwrap(),
    );
    let expected: Vec<KeyState> = (0..100i64)
        .filter(|k| (10..20).contains(k) || (50..60).contains(k) || (81..=90).contains(k))
        .map(int_key)
        .collect();
    assert_eq!(scan_forward(&store, &filter), expected);
    let mut reversed = expected;
    reversed.reverse();
    assert_eq!(scan_backward(&store, &filter), reversed);
}

#[test]
fn multi_level_filter_scan_matches_linear_scan() {
    let mut store = BTreeSet::new();
    let mut key = Key::new();
    key.append("atlantic").append(1.3f32).append("x");
    store.insert(key.state());
    for v in [125i64, 175, 200] {
        key.append(v);
        store.insert(key.state());
        key.cut(1);
    }
    key.append(200).append("tom");
    store.insert(key.state());
    key.append("dick");
    store.insert(key.state());
    key.append("harry");
    store.insert(key.state());
    key.cut(4);
    for v in [249i64, 250, 299, 300, 350] {
        key.append(v);
        store.insert(key.state());
        key.cut(1);
    }
    // Off-filter rows the scan must skip without visiting.
    store.insert(Key::new().append("arctic").state());
    store.insert(Key::new().append("atlantic").append(1.3f32).append("w").state());
    store.insert(Key::new().append("pacific").append(9i64).state());

    let filter = KeyFilter::parse(
        "{\"atlantic\",>(float)1.3,\"x\":\"z\",{100:150,200:250,[300:350)},*<}",
    )
    .unwrap();
    assert_scan_matches_linear(&store, &filter);

    let selected = scan_forward(&store, &filter);
    let rendered: Vec<String> = selected.iter().map(|ks| ks.to_key().to_string()).collect();
    assert_eq!(
        rendered,
        [
            "{\"atlantic\",(float)1.3,\"x\"}",
            "{\"atlantic\",(float)1.3,\"x\",125}",
            "{\"atlantic\",(float)1.3,\"x\",200}",
            "{\"atlantic\",(float)1.3,\"x\",200,\"tom\"}",
            "{\"atlantic\",(float)1.3,\"x\",249}",
            "{\"atlantic\",(float)1.3,\"x\",250}",
            "{\"atlantic\",(float)1.3,\"x\",300}",
        ]
    );
}

#[test]
fn depth_limit_bounds_every_selected_key() {
    let mut store = BTreeSet::new();
    let mut key = Key::new();
    key.append("a");
    store.insert(key.state());
    key.append("b");
    store.insert(key.state());
    key.append("c");
    store.insert(key.state());
    key.append("d");
    store.insert(key.state());

    let filter = KeyFilter::new()
        .append(Term::simple("a"))
        .limit(2, 3);
    let selected = scan_forward(&store, &filter);
    assert!(!selected.is_empty());
    for ks in &selected {
        let depth = ks.to_key().depth();
        assert!((2..=3).contains(&depth), "depth {depth} escaped the limit");
    }
    assert_scan_matches_linear(&store, &filter);
}

#[test]
fn simple_term_filter_visits_single_subtree() {
    let mut store = BTreeSet::new();
    for region in ["arctic", "atlantic", "pacific"] {
        for depth2 in 0..5i64 {
            store.insert(Key::new().append(region).append(depth2).state());
        }
    }
    let filter = KeyFilter::new()
        .append(Term::simple("atlantic"))
        .limit(1, 2);
    assert_scan_matches_linear(&store, &filter);
    assert_eq!(scan_forward(&store, &filter).len(), 6);
}

#[test]
fn open_ranges_scan_to_the_store_edge() {
    let store: BTreeSet<KeyState> = (0..50).map(int_key).collect();
    let from_20 = KeyFilter::parse("{20:}").unwrap();
    assert_scan_matches_linear(&store, &from_20);
    assert_eq!(scan_forward(&store, &from_20).len(), 30);
    let to_20 = KeyFilter::parse("{:20}").unwrap();
    assert_scan_matches_linear(&store, &to_20);
    assert_eq!(scan_forward(&store, &to_20).len(), 21);
}

#[test]
fn mixed_type_store_scans_cleanly() {
    let mut store = BTreeSet::new();
    store.insert(Key::new().append(Segment::Null).state());
    store.insert(Key::new().append(false).state());
    store.insert(Key::new().append(-5i64).state());
    store.insert(Key::new().append(0i64).state());
    store.insert(Key::new().append(7i64).state());
    store.insert(Key::new().append(2.5f64).state());
    store.insert(Key::new().append("text").state());
    let filter = KeyFilter::parse("{-5:7}").unwrap();
    assert_scan_matches_linear(&store, &filter);
    assert_eq!(scan_forward(&store, &filter).len(), 3);
}
