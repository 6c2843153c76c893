//! Store lifecycle tests: id reuse across sessions, crash detection,
//! mapping fallback and dynamic value round trips

use slotstore_core::id_allocator::{HEADER_SIZE, IdAllocator};
use slotstore_core::store::dynamic::{DynamicStore, NO_PREV_BLOCK};
use slotstore_core::store::record_store::id_file_path;
use slotstore_core::store::{NO_NEXT_BLOCK, StorableValue};
use slotstore_core::{
    Error, OpType, OwnerToken, RecordStore, StoreConfig, StoreFormat, WindowKind,
};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::TempDir;

/// Route engine logs through the test harness; `RUST_LOG` overrides the level
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotstore_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn format() -> StoreFormat {
    StoreFormat::new("V1", 9)
}

fn create_and_open(path: &Path, config: &StoreConfig) -> RecordStore {
    RecordStore::create(path, &format()).unwrap();
    RecordStore::open(path, format(), config).unwrap()
}

#[test]
fn test_freed_id_reused_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.db");
    let store = create_and_open(&path, &StoreConfig::default());

    assert_eq!(store.next_id().unwrap(), 0);
    assert_eq!(store.next_id().unwrap(), 1);
    assert_eq!(store.next_id().unwrap(), 2);
    store.free_id(1).unwrap();
    store.close().unwrap();

    let store = RecordStore::open(&path, format(), &StoreConfig::default()).unwrap();
    assert!(store.is_store_ok());
    assert_eq!(store.next_id().unwrap(), 1);
    assert_eq!(store.next_id().unwrap(), 3);
    store.close().unwrap();
}

#[test]
fn test_sticky_id_file_is_rejected() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.db");
    let store = create_and_open(&path, &StoreConfig::default());
    store.next_id().unwrap();
    store.close().unwrap();

    let id_path = id_file_path(&path);
    let mut file = OpenOptions::new().write(true).open(&id_path).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&[1]).unwrap();
    drop(file);

    assert!(matches!(
        IdAllocator::open(&id_path, 16),
        Err(Error::CorruptAllocator { .. })
    ));

    // The store opens anyway, refuses work, and comes back after a rebuild
    let store = RecordStore::open(&path, format(), &StoreConfig::default()).unwrap();
    assert!(!store.is_store_ok());
    assert!(matches!(store.next_id(), Err(Error::StoreNotValid(_))));
    store.make_store_ok().unwrap();
    assert!(store.is_store_ok());
    store.close().unwrap();
}

#[test]
fn test_budget_below_floor_only_hands_out_row_windows() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.db");
    let config = StoreConfig {
        mapped_memory: 10 * 9 - 1,
        ..StoreConfig::default()
    };
    let store = create_and_open(&path, &config);
    let owner = OwnerToken::new();

    for _ in 0..200 {
        let id = store.next_id().unwrap();
        let guard = store.acquire_window(id, OpType::Write, owner).unwrap();
        assert_eq!(guard.kind(), WindowKind::Row);
        assert_eq!(guard.size(), 1);
        guard.write_record(id, &[1, 0, 0, 0, 0, 0, 0, 0, id as u8]).unwrap();
        store.release_window(guard).unwrap();
    }
    for id in 0..200 {
        let guard = store.acquire_window(id, OpType::Read, owner).unwrap();
        assert_eq!(guard.kind(), WindowKind::Row);
        assert_eq!(guard.read_record(id).unwrap()[8], id as u8);
        store.release_window(guard).unwrap();
    }

    let windows = store.stats().unwrap().windows.unwrap();
    assert_eq!(windows.brick_size, 0);
    assert_eq!(windows.mapped_bricks, 0);
    assert_eq!(windows.hits, 0);
    store.close().unwrap();
}

#[test]
fn test_writes_survive_reopen_with_and_without_mapping() {
    for config in [StoreConfig::default(), StoreConfig::without_mapping()] {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        let store = create_and_open(&path, &config);
        let owner = OwnerToken::new();
        for _ in 0..50 {
            let id = store.next_id().unwrap();
            let mut slot = [0u8; 9];
            slot[0] = 1;
            slot[1..9].copy_from_slice(&(id * 3).to_be_bytes());
            store.write_slot(id, &slot, owner).unwrap();
        }
        store.close().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 50 * 9 + 2);

        let store = RecordStore::open(&path, format(), &config).unwrap();
        for id in 0..50 {
            let slot = store.read_slot(id, owner).unwrap();
            assert_eq!(u64::from_be_bytes(slot[1..9].try_into().unwrap()), id * 3);
        }
        store.close().unwrap();
    }
}

#[test]
fn test_close_and_rebuild_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.db");
    let store = create_and_open(&path, &StoreConfig::default());
    assert!(store.make_store_ok().unwrap().is_none());
    store.close().unwrap();
    store.close().unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"V1");
    assert_eq!(
        fs::metadata(id_file_path(&path)).unwrap().len(),
        HEADER_SIZE
    );
}

#[test]
fn test_second_handle_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.db");
    let store = create_and_open(&path, &StoreConfig::default());
    assert!(matches!(
        RecordStore::open(&path, format(), &StoreConfig::default()),
        Err(Error::Locked(_))
    ));
    store.close().unwrap();
    RecordStore::open(&path, format(), &StoreConfig::default())
        .unwrap()
        .close()
        .unwrap();
}

fn dynamic_store(dir: &TempDir, block_size: usize) -> (DynamicStore, std::path::PathBuf) {
    let path = dir.path().join("strings.db");
    DynamicStore::create(&path, "StringStore v1.0", block_size).unwrap();
    let store = DynamicStore::open(&path, "StringStore v1.0", &StoreConfig::default()).unwrap();
    (store, path)
}

#[test]
fn test_thirty_char_string_spans_three_blocks() {
    let dir = TempDir::new().unwrap();
    let (store, _) = dynamic_store(&dir, 12);
    let owner = OwnerToken::new();
    let text = "abcdefghijklmnopqrstuvwxyz0123";
    assert_eq!(text.len(), 30);

    let head = store.store_value(&StorableValue::from(text), owner).unwrap();
    let records = store.get_records(head, owner).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].prev_block, NO_PREV_BLOCK);
    assert_eq!(records[0].next_block, records[1].id);
    assert_eq!(records[1].prev_block, records[0].id);
    assert_eq!(records[1].next_block, records[2].id);
    assert_eq!(records[2].prev_block, records[1].id);
    assert_eq!(records[2].next_block, NO_NEXT_BLOCK);
    assert_eq!(store.get_string_for(head, owner).unwrap(), text);
    store.close().unwrap();
}

#[test]
fn test_values_round_trip_across_chain_lengths() {
    let dir = TempDir::new().unwrap();
    let (store, path) = dynamic_store(&dir, 8);
    let owner = OwnerToken::new();

    let values = [
        (StorableValue::String(String::new()), 1),
        (StorableValue::String("short".into()), 1),
        (StorableValue::String("a string that needs several blocks".into()), 5),
        (StorableValue::IntArray(vec![]), 1),
        (StorableValue::LongArray(vec![i64::MIN, 0, i64::MAX]), 4),
        (
            StorableValue::StringArray(vec!["one".into(), String::new(), "three".into()]),
            4,
        ),
    ];
    let heads: Vec<u64> = values
        .iter()
        .map(|(value, blocks)| {
            let head = store.store_value(value, owner).unwrap();
            assert_eq!(store.get_light_records(head, owner).unwrap().len(), *blocks);
            head
        })
        .collect();
    store.close().unwrap();

    let store = DynamicStore::open(&path, "StringStore v1.0", &StoreConfig::default()).unwrap();
    for ((value, _), &head) in values.iter().zip(&heads) {
        let records = store.get_records(head, owner).unwrap();
        assert_eq!(&store.get_value(&records).unwrap(), value);
    }
    assert_eq!(store.get_array(heads[5], owner).unwrap(), values[5].0);
    assert!(store.get_string_for(heads[5], owner).is_err());
    assert!(store.get_array(heads[1], owner).is_err());
    store.close().unwrap();
}

/// Every kind of value: scalars once, variable-length kinds empty, with one
/// element, and long enough to span at least three 8-byte blocks
fn every_value_kind() -> Vec<(StorableValue, bool)> {
    let floats = [
        f32::from_bits(0x7fc0_1234),
        -0.0,
        f32::INFINITY,
        f32::NEG_INFINITY,
        f32::from_bits(1),
        f32::MAX,
    ];
    let doubles = [
        f64::from_bits(0x7ff8_0000_0000_beef),
        -0.0,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::from_bits(1),
        f64::MIN,
    ];
    let long = 24;

    let mut values = vec![
        (StorableValue::Bool(true), false),
        (StorableValue::Byte(i8::MIN), false),
        (StorableValue::Short(-2), false),
        (StorableValue::Char('\u{1F980}'), false),
        (StorableValue::Int(i32::MAX), false),
        (StorableValue::Long(i64::MIN), false),
    ];
    values.extend(floats.iter().map(|f| (StorableValue::Float(*f), false)));
    values.extend(doubles.iter().map(|d| (StorableValue::Double(*d), false)));

    let kinds: Vec<fn(usize) -> StorableValue> = vec![
        |n| StorableValue::String("é".repeat(n)),
        |n| StorableValue::Bytes((0..n).map(|i| i as u8).collect()),
        |n| StorableValue::BoolArray((0..n).map(|i| i % 3 == 0).collect()),
        |n| StorableValue::ByteArray((0..n).map(|i| i as i8 - 12).collect()),
        |n| StorableValue::ShortArray((0..n).map(|i| i as i16 * -300).collect()),
        |n| StorableValue::CharArray("aé€🦀".chars().cycle().take(n).collect()),
        |n| StorableValue::IntArray((0..n).map(|i| i as i32 * -70_000).collect()),
        |n| StorableValue::LongArray((0..n).map(|i| i64::MAX / 30 * i as i64).collect()),
        |n| {
            let floats = [f32::from_bits(0x7fc0_1234), -0.0, f32::INFINITY, f32::from_bits(1)];
            StorableValue::FloatArray(floats.into_iter().cycle().take(n).collect())
        },
        |n| {
            let doubles = [f64::from_bits(0x7ff8_0000_0000_beef), -0.0, f64::NEG_INFINITY];
            StorableValue::DoubleArray(doubles.into_iter().cycle().take(n).collect())
        },
        |n| StorableValue::StringArray((0..n).map(|i| "x".repeat(i % 4)).collect()),
    ];
    for kind in kinds {
        values.push((kind(0), false));
        values.push((kind(1), false));
        values.push((kind(long), true));
    }
    values
}

#[test]
fn test_every_value_kind_round_trips_through_chains() {
    let dir = TempDir::new().unwrap();
    let (store, path) = dynamic_store(&dir, 8);
    let owner = OwnerToken::new();
    let values = every_value_kind();

    let mut tags: Vec<u8> = values.iter().map(|(v, _)| v.tag()).collect();
    tags.sort_unstable();
    tags.dedup();
    assert_eq!(tags.len(), 19);

    let heads: Vec<u64> = values
        .iter()
        .map(|(value, spans)| {
            let blob = value.encode().unwrap();
            let head = store.store_value(value, owner).unwrap();
            let blocks = store.get_light_records(head, owner).unwrap().len();
            assert_eq!(blocks, blob.len().div_ceil(8), "{}", value.type_name());
            if *spans {
                assert!(blocks >= 3, "{} spans only {} blocks", value.type_name(), blocks);
            }
            head
        })
        .collect();
    store.close().unwrap();

    let store = DynamicStore::open(&path, "StringStore v1.0", &StoreConfig::default()).unwrap();
    for ((value, _), &head) in values.iter().zip(&heads) {
        let decoded = store.get_value(&store.get_records(head, owner).unwrap()).unwrap();
        assert_eq!(decoded.tag(), value.tag());
        assert_eq!(
            decoded.encode().unwrap(),
            value.encode().unwrap(),
            "{} changed in storage",
            value.type_name()
        );
    }
    store.close().unwrap();
}
