//! End-to-end scenarios exercising each collection through its public API only.

use opaque_collections::{
    Direction, Error, OpaqueArray, OpaqueHashTable, OpaqueList, polynomial_hash,
};

fn hash_str(key: &&'static str) -> usize {
    polynomial_hash(key.as_bytes())
}

fn eq_str(a: &&'static str, b: &&'static str) -> bool {
    a == b
}

#[test]
fn array_of_squares_with_one_removed() {
    let mut array = OpaqueArray::builder().layout_of::<i32>().build().unwrap();

    for i in 0..5_i32 {
        // SAFETY: The array was built for i32.
        unsafe { array.push_back(i * i) }.unwrap();
    }

    array.remove_at(2).unwrap();

    // SAFETY: The array was built for i32.
    let items = unsafe { array.as_slice::<i32>() };
    assert_eq!(items, [0, 1, 9, 16]);
    assert_eq!(array.len(), 4);

    // SAFETY: The array was built for i32.
    let reversed: Vec<i32> = unsafe { array.as_slice::<i32>() }
        .iter()
        .rev()
        .copied()
        .collect();
    assert_eq!(reversed, [16, 9, 1, 0]);
}

#[test]
fn array_keeps_values_through_many_growths() {
    let mut array = OpaqueArray::builder()
        .layout_of::<u64>()
        .initial_capacity(1)
        .build()
        .unwrap();

    for i in 0..1000_u64 {
        // SAFETY: The array was built for u64.
        unsafe { array.push_back(i) }.unwrap();
    }

    for i in (0..1000_u64).step_by(97) {
        let index = usize::try_from(i).unwrap();

        // SAFETY: The array was built for u64.
        assert_eq!(unsafe { array.get::<u64>(index) }, Some(&i));
    }

    assert!(array.capacity() >= 1000);
}

#[test]
fn list_removes_all_matching_values() {
    let mut list = OpaqueList::builder().layout_of::<i32>().build().unwrap();

    for value in [0, 1, 4, 9, 16, 16, 25] {
        // SAFETY: The list was built for i32.
        unsafe { list.push_back(value) }.unwrap();
    }

    // SAFETY: The list was built for i32.
    let removed = unsafe { list.remove_all_matching(&1_i32) };
    assert_eq!(removed, 1);

    // SAFETY: The list was built for i32.
    let forward: Vec<i32> = unsafe { list.iter::<i32>() }.copied().collect();
    assert_eq!(forward, [0, 4, 9, 16, 16, 25]);

    // SAFETY: The list was built for i32.
    let backward: Vec<i32> = unsafe { list.iter::<i32>() }.rev().copied().collect();
    assert_eq!(backward, [25, 16, 16, 9, 4, 0]);
}

#[test]
fn list_manual_cursor_removes_odd_squares() {
    let mut list = OpaqueList::builder().layout_of::<u32>().build().unwrap();

    for i in 0..10_u32 {
        // SAFETY: The list was built for u32.
        unsafe { list.push_back(i * i) }.unwrap();
    }

    // Walk from the back, removing as we go and resuming from the returned neighbor.
    let mut cursor = list.back();

    while let Some(node) = cursor {
        // SAFETY: The cursor always refers to a live node and the list was built for u32.
        unsafe {
            cursor = if list.item::<u32>(node) % 2 == 1 {
                list.remove_node(node, Direction::Backward)
            } else {
                list.previous(node)
            };
        }
    }

    // SAFETY: The list was built for u32.
    let even: Vec<u32> = unsafe { list.iter::<u32>() }.copied().collect();
    assert_eq!(even, [0, 4, 16, 36, 64]);
}

#[test]
fn list_front_pushes_reverse_order() {
    let mut list = OpaqueList::builder().layout_of::<u8>().build().unwrap();

    for value in 1..=5_u8 {
        // SAFETY: The list was built for u8.
        unsafe { list.push_front(value) }.unwrap();
    }

    // SAFETY: The list was built for u8.
    let items: Vec<u8> = unsafe { list.iter::<u8>() }.copied().collect();
    assert_eq!(items, [5, 4, 3, 2, 1]);

    assert_eq!(list.nodes().len(), 5);
    assert_eq!(list.nodes().rev().count(), 5);
}

#[test]
fn hash_table_of_strings() {
    let mut table = OpaqueHashTable::builder()
        .key_layout_of::<&'static str>()
        .hash_fn(hash_str)
        .compare_fn(eq_str)
        .value_layout_of::<&'static str>()
        .bucket_count(256)
        .build()
        .unwrap();

    // SAFETY: Keys and values are &'static str, as configured.
    unsafe {
        table.insert("abc", "def").unwrap();
        table.insert("ock", "dlcma").unwrap();
        table.insert("d3q", "lcke").unwrap();

        let found = table.search(&"abc").unwrap();
        assert_eq!(*found.value::<&str>(), "def");

        table.remove(&"ock").unwrap();
        assert!(table.search(&"ock").is_none());
        assert!(matches!(table.remove(&"ock"), Err(Error::KeyNotFound)));
    }

    assert_eq!(table.len(), 2);
}

#[test]
fn hash_table_reinsert_counts_once() {
    let mut table = OpaqueHashTable::builder()
        .key_traits_of::<String>()
        .value_layout_of::<Vec<u8>>()
        .bucket_count(4)
        .build()
        .unwrap();

    // SAFETY: Keys are String and values are Vec<u8>, as configured.
    unsafe {
        assert!(table.insert("k".to_string(), vec![1]).unwrap());
        assert_eq!(table.len(), 1);

        assert!(!table.insert("k".to_string(), vec![2, 2]).unwrap());
        assert_eq!(table.len(), 1);

        assert_eq!(
            table.get::<String, Vec<u8>>(&"k".to_string()),
            Some(&vec![2, 2])
        );
    }
}

#[test]
fn hash_table_entries_cover_all_keys() {
    let mut table = OpaqueHashTable::builder()
        .key_traits_of::<u16>()
        .value_layout_of::<u16>()
        .bucket_count(5)
        .build()
        .unwrap();

    // SAFETY: Keys and values are u16, as configured.
    unsafe {
        for key in 0..40_u16 {
            table.insert(key, key.wrapping_mul(3)).unwrap();
        }
    }

    let mut keys: Vec<u16> = table
        .entries()
        // SAFETY: Keys are u16, as configured.
        .map(|entry| unsafe { *entry.key::<u16>() })
        .collect();
    keys.sort_unstable();

    assert_eq!(keys, (0..40).collect::<Vec<u16>>());
}
