//! Integration Tests for the Store
//!
//! These tests verify that cells, scopes, subscriptions and pending
//! computations work together correctly.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use focal_core::classify::{is_cell_constructor, ClassifierConfig, Expr};
use focal_core::{
    loadable, select, split, Cell, CellError, CellFamily, DirtyState, Loadable, Scope, Store,
};
use futures_util::future::FutureExt;
use futures_util::task::noop_waker_ref;
use tokio::sync::oneshot;

fn counting(calls: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test that a derived cell tracks its dependency.
#[test]
fn derived_tracks_dependency() {
    let store = Store::new();
    let count = Cell::new(10);
    let doubled = {
        let count = count.clone();
        Cell::derived(move |get| Ok(get.get(&count)? * 2))
    };

    assert_eq!(store.get(&doubled, Scope::GLOBAL), Ok(20));

    store.write(&count, Scope::GLOBAL, 5).unwrap();
    assert_eq!(store.get(&doubled, Scope::GLOBAL), Ok(10));
}

/// Test that derived cells cache until read after a change.
#[test]
fn derived_is_lazy_and_cached() {
    let store = Store::new();
    let compute_count = Arc::new(AtomicI32::new(0));
    let compute_clone = compute_count.clone();
    let base = Cell::new(1);
    let expensive = {
        let base = base.clone();
        Cell::derived(move |get| {
            compute_clone.fetch_add(1, Ordering::SeqCst);
            Ok(get.get(&base)? + 41)
        })
    };

    assert_eq!(store.get(&expensive, Scope::GLOBAL), Ok(42));
    assert_eq!(store.get(&expensive, Scope::GLOBAL), Ok(42));
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    store.write(&base, Scope::GLOBAL, 2).unwrap();
    store.write(&base, Scope::GLOBAL, 3).unwrap();
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    assert_eq!(store.get(&expensive, Scope::GLOBAL), Ok(44));
    assert_eq!(compute_count.load(Ordering::SeqCst), 2);
}

/// Test that a chain of derived cells sees the latest value.
#[test]
fn derived_chain() {
    let store = Store::new();
    let base = Cell::new(1);
    let plus_one = {
        let base = base.clone();
        Cell::derived(move |get| Ok(get.get(&base)? + 1))
    };
    let times_ten = {
        let plus_one = plus_one.clone();
        Cell::derived(move |get| Ok(get.get(&plus_one)? * 10))
    };

    assert_eq!(store.get(&times_ten, Scope::GLOBAL), Ok(20));
    store.update(&base, Scope::GLOBAL, |n| n + 1).unwrap();
    assert_eq!(
        store.dirty_state(&times_ten, Scope::GLOBAL),
        Some(DirtyState::MaybeDirty)
    );
    assert_eq!(store.get(&times_ten, Scope::GLOBAL), Ok(30));
}

/// Test that dependencies are re-discovered on every computation.
#[test]
fn dynamic_dependencies() {
    let store = Store::new();
    let use_left = Cell::new(true);
    let left = Cell::new("left");
    let right = Cell::new("right");
    let runs = Arc::new(AtomicUsize::new(0));
    let chosen = {
        let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
        let runs = runs.clone();
        Cell::derived(move |get| {
            runs.fetch_add(1, Ordering::SeqCst);
            if get.get(&use_left)? {
                get.get(&left)
            } else {
                get.get(&right)
            }
        })
    };

    assert_eq!(store.get(&chosen, Scope::GLOBAL), Ok("left"));

    store.write(&right, Scope::GLOBAL, "RIGHT").unwrap();
    assert_eq!(store.get(&chosen, Scope::GLOBAL), Ok("left"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.write(&use_left, Scope::GLOBAL, false).unwrap();
    assert_eq!(store.get(&chosen, Scope::GLOBAL), Ok("RIGHT"));

    store.write(&left, Scope::GLOBAL, "LEFT").unwrap();
    assert_eq!(store.get(&chosen, Scope::GLOBAL), Ok("RIGHT"));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that subscribers are only told about observable changes.
#[test]
fn subscribers_notified_on_change_only() {
    let store = Store::new();
    let base = Cell::new(2);
    let is_even = select(&base, |n: &i32| n % 2 == 0);

    let base_calls = Arc::new(AtomicUsize::new(0));
    let even_calls = Arc::new(AtomicUsize::new(0));
    let _base_sub = store.subscribe(&base, Scope::GLOBAL, counting(&base_calls));
    let _even_sub = store.subscribe(&is_even, Scope::GLOBAL, counting(&even_calls));

    store.write(&base, Scope::GLOBAL, 4).unwrap();
    store.write(&base, Scope::GLOBAL, 4).unwrap();
    store.write(&base, Scope::GLOBAL, 5).unwrap();

    assert_eq!(base_calls.load(Ordering::SeqCst), 2);
    assert_eq!(even_calls.load(Ordering::SeqCst), 1);
}

/// Test that a listener may read the store it is subscribed to.
#[test]
fn listener_reads_store() {
    let store = Store::new();
    let base = Cell::new(0);
    let seen = Arc::new(AtomicI32::new(-1));

    let _sub = {
        let (reader, base_clone, seen) = (store.clone(), base.clone(), seen.clone());
        store.subscribe(&base, Scope::GLOBAL, move || {
            let value = reader.get(&base_clone, Scope::GLOBAL).unwrap_or(-2);
            seen.store(value, Ordering::SeqCst);
        })
    };

    store.write(&base, Scope::GLOBAL, 9).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 9);
}

/// Test that scopes hold independent entries for the same cell.
#[test]
fn scopes_are_independent() {
    let store = Store::new();
    let first = Scope::new();
    let second = Scope::new();
    let base = Cell::new(0);
    let doubled = {
        let base = base.clone();
        Cell::derived(move |get| Ok(get.get(&base)? * 2))
    };

    store.write(&base, first, 1).unwrap();
    store.write(&base, second, 2).unwrap();

    assert_eq!(store.get(&doubled, Scope::GLOBAL), Ok(0));
    assert_eq!(store.get(&doubled, first), Ok(2));
    assert_eq!(store.get(&doubled, second), Ok(4));

    let calls = Arc::new(AtomicUsize::new(0));
    let _sub = store.subscribe(&doubled, first, counting(&calls));
    store.write(&base, second, 3).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.dispose_scope(second);
    assert_eq!(store.get(&doubled, first), Ok(2));
    assert_eq!(store.get(&base, second), Ok(0));
}

/// Test that a failure is cached and surfaced until the next write.
#[test]
fn failures_are_cached_per_entry() {
    let store = Store::new();
    let input = Cell::new(String::from("12"));
    let runs = Arc::new(AtomicUsize::new(0));
    let parsed = {
        let input = input.clone();
        let runs = runs.clone();
        Cell::derived(move |get| {
            runs.fetch_add(1, Ordering::SeqCst);
            get.get(&input)?.parse::<i32>().map_err(CellError::failure)
        })
    };
    let safe = loadable(&parsed);

    assert_eq!(store.get(&parsed, Scope::GLOBAL), Ok(12));

    store.write(&input, Scope::GLOBAL, String::from("twelve")).unwrap();
    let first = store.read(&parsed, Scope::GLOBAL);
    assert!(first.is_failed());
    assert_eq!(store.read(&parsed, Scope::GLOBAL), first);
    assert!(store.get(&safe, Scope::GLOBAL).unwrap().is_failed());
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    store.write(&input, Scope::GLOBAL, String::from("7")).unwrap();
    assert_eq!(store.get(&safe, Scope::GLOBAL), Ok(Loadable::Ready(7)));
}

/// Test driving pending computations by hand.
#[test]
fn poll_settle_by_hand() {
    let store = Store::new();
    let (open, rx) = oneshot::channel::<i32>();
    let gate = rx.shared();
    let remote = {
        let gate = gate.clone();
        Cell::derived_async(move |_| {
            let gate = gate.clone();
            Ok(async move { gate.await.map_err(CellError::failure) })
        })
    };
    let status = loadable(&remote);

    let mut cx = Context::from_waker(noop_waker_ref());
    assert_eq!(store.get(&status, Scope::GLOBAL), Ok(Loadable::Pending));
    assert_eq!(store.poll_settle(&mut cx), Poll::Pending);
    assert!(!store.is_settled());

    open.send(11).unwrap();
    assert_eq!(store.poll_settle(&mut cx), Poll::Ready(()));
    assert_eq!(store.get(&status, Scope::GLOBAL), Ok(Loadable::Ready(11)));
}

/// Test that a superseded computation never overwrites a newer one.
#[tokio::test]
async fn superseded_settlement_is_discarded() {
    let store = Store::new();
    let (open_slow, slow) = oneshot::channel::<i32>();
    let (open_fast, fast) = oneshot::channel::<i32>();
    let slow = slow.shared();
    let gates = Arc::new(parking_lot::Mutex::new(vec![fast.shared(), slow.clone()]));

    let trigger = Cell::new(0);
    let fetched = {
        let (trigger, gates) = (trigger.clone(), gates.clone());
        Cell::derived_async(move |get| {
            get.get(&trigger)?;
            let gate = gates.lock().pop();
            Ok(async move {
                match gate {
                    Some(gate) => gate.await.map_err(CellError::failure),
                    None => Err(CellError::failure("no gate left")),
                }
            })
        })
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let _sub = store.subscribe(&fetched, Scope::GLOBAL, counting(&calls));
    store.write(&trigger, Scope::GLOBAL, 1).unwrap();
    assert_eq!(store.pending_count(), 1);

    open_slow.send(1).unwrap();
    open_fast.send(2).unwrap();
    store.settle().await;

    assert_eq!(store.get(&fetched, Scope::GLOBAL), Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test that families and split hand out stable cells.
#[test]
fn families_and_split_reuse_cells() {
    let store = Store::new();
    let todos = CellFamily::new(|id: &u32| Cell::new(format!("todo {id}")));
    assert_eq!(todos.get(1), todos.get(1));

    store
        .update(&todos.get(1), Scope::GLOBAL, |s| format!("{s} (done)"))
        .unwrap();
    assert_eq!(store.get(&todos.get(1), Scope::GLOBAL).as_deref(), Ok("todo 1 (done)"));

    let list = Cell::new(vec!['a', 'b']);
    let items = split(&list);
    let before = store.get(&items, Scope::GLOBAL).unwrap();
    store.write(&before[0], Scope::GLOBAL, 'z').unwrap();
    let after = store.get(&items, Scope::GLOBAL).unwrap();

    assert_eq!(before, after);
    assert_eq!(store.get(&list, Scope::GLOBAL), Ok(vec!['z', 'b']));
}

/// Test that the store can be shared across threads.
#[test]
fn store_is_shareable_across_threads() {
    let store = Store::new();
    let counter = Cell::new(0_u64);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (store, counter) = (store.clone(), counter.clone());
            std::thread::spawn(move || {
                let scope = Scope::new();
                for _ in 0..100 {
                    store.update(&counter, scope, |n| n + 1).unwrap();
                }
                store.get(&counter, scope)
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(100));
    }

    assert_eq!(store.get(&counter, Scope::GLOBAL), Ok(0));
    assert_eq!(store.entry_count(), 5);
}

/// Test the classifier against the constructors this crate exposes.
#[test]
fn classifier_recognizes_constructors() {
    let config = ClassifierConfig::from_json(r#"{ "customCellNames": ["counter"] }"#).unwrap();

    assert!(is_cell_constructor(&Expr::ident("cell"), &config));
    assert!(is_cell_constructor(&Expr::ident("select_cell"), &config));
    assert!(is_cell_constructor(
        &Expr::member(Expr::ident("state"), Expr::ident("counter")),
        &config
    ));
    assert!(!is_cell_constructor(&Expr::ident("counter"), &config));
    assert!(!is_cell_constructor(&Expr::ident("println"), &config));
}
