use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::prelude::random;
use rand::seq::SliceRandom;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use simplelog::{Config, LevelFilter, TestLogger};

use crate::compare::{Comparator, Lexical};
use crate::error::RbError;
use crate::rbtree::Rbtree;

#[test]
fn test_id() {
    let index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    assert_eq!(index.id(), "test-rbtree".to_string());
}

#[test]
fn test_len() {
    let index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    assert_eq!(index.len(), 0);
    assert!(index.is_empty());
    assert!(index.validate().is_ok());
}

#[test]
fn test_insert() {
    init_logger();
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    let mut refns = RefNodes::new(10);

    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        assert!(index.insert(*key, 10).is_ok());
        assert!(refns.insert(*key, 10));
        assert!(index.validate().is_ok());
    }

    assert_eq!(index.len(), 10);
    assert!(index.validate().is_ok());

    // error case
    assert_eq!(index.insert(7, 20), Err(RbError::OverwriteKey));
    assert_eq!(index.len(), 10);

    // test get
    for i in 0..10 {
        let val = index.get(&i);
        let refval = refns.get(i);
        assert_eq!(val, refval);
    }
    assert_eq!(index.get(&10), None);
    assert!(index.contains_key(&9));
    assert!(!index.contains_key(&-1));
}

#[test]
fn test_no_duplicates() {
    let mut index: Rbtree<i64, &str> = Rbtree::new("test-rbtree");

    assert!(index.insert(42, "first").is_ok());
    assert_eq!(index.insert(42, "second"), Err(RbError::OverwriteKey));
    assert_eq!(index.get(&42), Some("first"));
    assert_eq!(index.len(), 1);
    assert!(index.validate().is_ok());
}

#[test]
fn test_scenario() {
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");

    let keys = [50, 30, 70, 20, 40, 60, 80];
    for key in keys.iter() {
        assert!(index.insert(*key, key * 10).is_ok());
        assert!(index.validate().is_ok());
    }
    for key in keys.iter() {
        assert_eq!(index.get(key), Some(key * 10));
    }

    assert_eq!(index.remove(&30), Some((30, 300)));
    assert!(index.validate().is_ok());
    assert_eq!(index.get(&30), None);
    assert_eq!(index.len(), 6);

    for key in keys.iter().filter(|k| **k != 30) {
        assert_eq!(index.get(key), Some(key * 10));
    }
}

#[test]
fn test_remove() {
    init_logger();
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    let mut refns = RefNodes::new(11);

    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        assert!(index.insert(*key, 100).is_ok());
        refns.insert(*key, 100);
    }

    // remove a missing node.
    assert!(index.remove(&10).is_none());
    assert!(refns.remove(10).is_none());

    assert_eq!(index.len(), 10);
    assert!(index.validate().is_ok());

    // remove all entry.
    for i in 0..10 {
        let val = index.remove(&i);
        let refval = refns.remove(i);
        assert_eq!(val, refval);
        assert!(index.validate().is_ok());
        assert_eq!(index.get(&i), None);
    }
    assert_eq!(index.len(), 0);
    assert!(index.is_empty());
    assert!(index.validate().is_ok());

    // removing from an empty tree.
    assert!(index.remove(&0).is_none());
}

#[test]
fn test_remove_red_sibling() {
    // ascending load of six keys leaves a red node next to the left-most
    // leaf, removing that leaf rotates around its red sibling first.
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    for key in 1..=6 {
        assert!(index.insert(key, -key).is_ok());
    }
    assert!(index.validate().is_ok());

    assert_eq!(index.remove(&1), Some((1, -1)));
    assert!(index.validate().is_ok());
    for key in 2..=6 {
        assert_eq!(index.get(&key), Some(-key));
    }
}

#[test]
fn test_sequential() {
    let n = 1000;
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");

    for key in 0..n {
        assert!(index.insert(key, key).is_ok());
        assert!(index.validate().is_ok());
    }
    for key in 0..n {
        assert_eq!(index.remove(&key), Some((key, key)));
        assert!(index.validate().is_ok());
    }
    assert!(index.is_empty());

    for key in (0..n).rev() {
        assert!(index.insert(key, key).is_ok());
        assert!(index.validate().is_ok());
    }
    for key in (0..n).rev() {
        assert_eq!(index.remove(&key), Some((key, key)));
        assert!(index.validate().is_ok());
    }
    assert!(index.is_empty());
}

#[test]
fn test_shuffled() {
    let seed = make_seed();
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());
    println!("test_shuffled seed {}", seed);

    for _ in 0..10 {
        let n: i64 = rng.gen_range(1, 2000);
        let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");

        for key in shuffled_keys(n, &mut rng) {
            assert!(index.insert(key, key * 3).is_ok());
            assert!(index.validate().is_ok());
        }
        assert_eq!(index.len(), n as usize);

        let stats = index.validate().unwrap();
        assert_eq!(stats.entries(), n as usize);
        assert!(stats.depths().unwrap().max() <= height_bound(n as usize));

        for key in 0..n {
            assert_eq!(index.get(&key), Some(key * 3));
        }

        for key in shuffled_keys(n, &mut rng) {
            assert_eq!(index.remove(&key), Some((key, key * 3)));
            assert!(index.validate().is_ok());
        }
        assert_eq!(index.len(), 0);
    }
}

#[test]
fn test_crud() {
    init_logger();
    let size = 1000;
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    let mut refns = RefNodes::new(size);

    for _ in 0..50_000 {
        let key: i64 = (random::<i64>() % (size as i64)).abs();
        let value: i64 = random();
        let op: i64 = (random::<i64>() % 3).abs();
        match op {
            0 => {
                let ok1 = index.insert(key, value).is_ok();
                let ok2 = refns.insert(key, value);
                assert_eq!(ok1, ok2);
            }
            1 => {
                let val = index.remove(&key);
                let refval = refns.remove(key);
                assert_eq!(val, refval);
            }
            2 => {
                let val = index.get(&key);
                let refval = refns.get(key);
                assert_eq!(val, refval);
            }
            op => panic!("unreachable {}", op),
        };

        assert!(index.validate().is_ok());
    }

    assert_eq!(index.len(), refns.len());
    for key in 0..(size as i64) {
        assert_eq!(index.get(&key), refns.get(key));
    }
}

#[test]
fn test_string_keys() {
    let mut index: Rbtree<String, usize> = Rbtree::new("test-rbtree");

    for i in 1..=1000 {
        assert!(index.insert("a".repeat(i), i).is_ok());
        assert!(index.validate().is_ok());
    }
    assert_eq!(index.len(), 1000);

    for i in 1..=1000 {
        let key = "a".repeat(i);
        assert_eq!(index.get(key.as_str()), Some(key.len()));
    }

    for i in 1..=1000 {
        let key = "a".repeat(i);
        let (rkey, value) = index.remove(key.as_str()).unwrap();
        assert_eq!(rkey, key);
        assert_eq!(value, key.len());
        assert!(index.validate().is_ok());
    }
    assert!(index.is_empty());
    assert!(index.validate().is_ok());
}

#[test]
fn test_lexical_keys() {
    let mut index: Rbtree<Vec<u8>, usize, Lexical> =
        Rbtree::with_comparator("test-rbtree", Lexical);

    let keys: Vec<&[u8]> = vec![
        &b"b"[..],
        &b"ab"[..],
        &b"a"[..],
        &b""[..],
        &b"abc"[..],
        &b"\xff"[..],
        &b"aa"[..],
        &b"ba"[..],
    ];
    for (i, key) in keys.iter().enumerate() {
        assert!(index.insert(key.to_vec(), i).is_ok());
        assert!(index.validate().is_ok());
    }
    assert_eq!(
        index.insert(b"ab".to_vec(), 100),
        Err(RbError::OverwriteKey)
    );

    for (i, key) in keys.iter().enumerate() {
        assert_eq!(index.get(*key), Some(i));
    }
    assert_eq!(index.get(&b"abcd"[..]), None);

    assert_eq!(index.remove(&b"ab"[..]), Some((b"ab".to_vec(), 1)));
    assert_eq!(index.remove(&b""[..]), Some((vec![], 3)));
    assert!(index.validate().is_ok());
    assert_eq!(index.len(), keys.len() - 2);
}

struct NoCase;

impl Comparator<str> for NoCase {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        let a = a.bytes().map(|c| c.to_ascii_lowercase());
        let b = b.bytes().map(|c| c.to_ascii_lowercase());
        a.cmp(b)
    }
}

impl Comparator<String> for NoCase {
    fn compare(&self, a: &String, b: &String) -> Ordering {
        Comparator::<str>::compare(self, a, b)
    }
}

#[test]
fn test_custom_comparator() {
    let mut index: Rbtree<String, i64, NoCase> = Rbtree::with_comparator("nocase", NoCase);

    assert!(index.insert("Apple".to_string(), 1).is_ok());
    assert!(index.insert("banana".to_string(), 2).is_ok());
    assert!(index.insert("Cherry".to_string(), 3).is_ok());
    assert_eq!(
        index.insert("APPLE".to_string(), 4),
        Err(RbError::OverwriteKey)
    );
    assert!(index.validate().is_ok());

    assert_eq!(index.get("apple"), Some(1));
    assert_eq!(index.get("CHERRY"), Some(3));
    // removed entry carries the stored key, not the probe.
    assert_eq!(index.remove("BANANA"), Some(("banana".to_string(), 2)));
    assert_eq!(index.get("banana"), None);
    assert_eq!(index.len(), 2);
}

#[test]
fn test_load_from() {
    let index = Rbtree::load_from("test-rbtree", (0..100_i64).map(|k| (k, k + 1))).unwrap();
    assert_eq!(index.len(), 100);
    assert!(index.validate().is_ok());
    for key in 0..100 {
        assert_eq!(index.get(&key), Some(key + 1));
    }

    let iter = vec![(1_i64, 1_i64), (2, 2), (1, 3)].into_iter();
    let res = Rbtree::load_from("test-rbtree", iter);
    assert_eq!(res.err(), Some(RbError::OverwriteKey));
}

#[test]
fn test_stats() {
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    let n = (1 << 12) - 1;
    for key in 0..n {
        assert!(index.insert(key, key).is_ok());
    }

    let stats = index.stats();
    assert_eq!(stats.entries(), n as usize);
    assert_eq!(stats.blacks(), None);
    assert!(stats.depths().is_none());

    let stats = index.validate().unwrap();
    assert_eq!(stats.entries(), n as usize);
    assert!(stats.blacks().unwrap() > 0);
    let depths = stats.depths().unwrap();
    // every NIL leaf is sampled.
    assert_eq!(depths.samples(), n as usize + 1);
    assert!(depths.min() <= depths.mean());
    assert!(depths.max() >= 12);
    assert!(depths.max() <= height_bound(n as usize));
    depths.pretty_print("test_stats ");
}

#[test]
fn test_clear() {
    init_logger();
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    for key in 0..100 {
        assert!(index.insert(key, key).is_ok());
    }
    index.clear();
    assert!(index.is_empty());
    assert_eq!(index.get(&10), None);
    assert!(index.validate().is_ok());

    for key in 0..10 {
        assert!(index.insert(key, key * 2).is_ok());
    }
    assert_eq!(index.len(), 10);
    assert_eq!(index.get(&9), Some(18));
    assert!(index.validate().is_ok());
}

#[test]
fn test_clone() {
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    for key in 0..100 {
        assert!(index.insert(key, key).is_ok());
    }
    let snapshot = index.clone();
    for key in 0..50 {
        assert!(index.remove(&key).is_some());
    }
    assert_eq!(snapshot.len(), 100);
    assert_eq!(snapshot.get(&10), Some(10));
    assert!(snapshot.validate().is_ok());
    assert_eq!(index.get(&10), None);
}

#[test]
fn test_clone_free_headroom() {
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    for key in 0..100 {
        assert!(index.insert(key, key).is_ok());
    }
    let (slots, cap) = index.arena_capacity();
    assert!(cap >= slots);

    let mut snapshot = index.clone();
    let (slots, cap) = snapshot.arena_capacity();
    assert_eq!(slots, 100);
    assert!(cap >= slots);

    // removing every entry fits in the reserved free list.
    for key in 0..100 {
        assert!(snapshot.remove(&key).is_some());
    }
    assert_eq!(snapshot.arena_capacity().1, cap);
    assert!(snapshot.validate().is_ok());
}

#[test]
fn test_insert_out_of_memory() {
    let mut index: Rbtree<i64, i64> = Rbtree::new("test-rbtree");
    for key in 0..10 {
        assert!(index.insert(key, key).is_ok());
    }

    index.fail_alloc = true;
    assert_eq!(index.insert(10, 10), Err(RbError::OutOfMemory));
    assert_eq!(index.len(), 10);
    assert_eq!(index.get(&10), None);
    assert_eq!(index.validate().unwrap().entries(), 10);
    // duplicates are rejected before any allocation.
    assert_eq!(index.insert(3, 0), Err(RbError::OverwriteKey));

    // recycled slots need no arena growth.
    assert_eq!(index.remove(&5), Some((5, 5)));
    assert!(index.insert(10, 10).is_ok());
    assert_eq!(index.insert(11, 11), Err(RbError::OutOfMemory));
    assert!(index.validate().is_ok());

    index.fail_alloc = false;
    assert!(index.insert(11, 11).is_ok());
    assert_eq!(index.len(), 11);
    assert!(index.validate().is_ok());
}

#[test]
fn test_error_display() {
    let err: RbError<i64> = RbError::OverwriteKey;
    assert_eq!(err.to_string(), "key already present");
    let err: RbError<i64> = RbError::EntryCount {
        expected: 3,
        found: 2,
    };
    assert_eq!(err.to_string(), "entry count mismatch, expected 3 found 2");
}

fn init_logger() {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
}

fn make_seed() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

include!("./ref_test.rs");
