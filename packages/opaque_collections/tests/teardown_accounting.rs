//! Verifies that every collection tears down each item exactly once, whichever path releases it.

use std::cell::Cell;
use std::rc::Rc;

use opaque_collections::{OpaqueArray, OpaqueHashTable, OpaqueList, Teardown};

/// Counts how many times values sharing the same counter have been dropped.
#[derive(Debug)]
struct Tracked {
    drops: Rc<Cell<usize>>,
}

impl Tracked {
    fn new(drops: &Rc<Cell<usize>>) -> Self {
        Self {
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get().wrapping_add(1));
    }
}

const ITEM_COUNT: usize = 25;

#[test]
fn array_push_then_pop_all_tears_down_each_once() {
    let drops = Rc::new(Cell::new(0));

    let mut array = OpaqueArray::builder()
        .layout_of::<Tracked>()
        .initial_capacity(2)
        .build()
        .unwrap();

    for _ in 0..ITEM_COUNT {
        // SAFETY: The array was built for Tracked.
        unsafe { array.push_back(Tracked::new(&drops)) }.unwrap();
    }
    assert_eq!(drops.get(), 0);

    for removed in 1..=ITEM_COUNT {
        if removed % 3 == 0 {
            array.pop_front().unwrap();
        } else if removed % 3 == 1 {
            array.pop_back().unwrap();
        } else {
            array.remove_at(array.len() / 2).unwrap();
        }

        assert_eq!(drops.get(), removed);
    }

    assert!(array.is_empty());
    drop(array);
    assert_eq!(drops.get(), ITEM_COUNT);
}

#[test]
fn array_drop_tears_down_remaining() {
    let drops = Rc::new(Cell::new(0));

    let mut array = OpaqueArray::builder()
        .layout_of::<Tracked>()
        .build()
        .unwrap();

    for _ in 0..ITEM_COUNT {
        // SAFETY: The array was built for Tracked.
        unsafe { array.push_back(Tracked::new(&drops)) }.unwrap();
    }

    drop(array);
    assert_eq!(drops.get(), ITEM_COUNT);
}

#[test]
fn list_push_then_remove_all_tears_down_each_once() {
    let drops = Rc::new(Cell::new(0));

    let mut list = OpaqueList::builder()
        .layout_of::<Tracked>()
        .build()
        .unwrap();

    for index in 0..ITEM_COUNT {
        // SAFETY: The list was built for Tracked.
        unsafe {
            if index % 2 == 0 {
                list.push_back(Tracked::new(&drops)).unwrap();
            } else {
                list.push_front(Tracked::new(&drops)).unwrap();
            }
        }
    }

    let mut flip = false;
    let removed = list.remove_all_where(|_item| {
        flip = !flip;
        flip
    });

    assert_eq!(drops.get(), removed);

    while !list.is_empty() {
        list.pop_back().unwrap();
    }

    assert_eq!(drops.get(), ITEM_COUNT);
    drop(list);
    assert_eq!(drops.get(), ITEM_COUNT);
}

#[test]
fn custom_teardown_replaces_drop() {
    thread_local! {
        static RELEASED: Cell<u32> = const { Cell::new(0) };
    }

    fn release(value: &mut u32) {
        RELEASED.with(|released| released.set(released.get().wrapping_add(*value)));
    }

    let mut list = OpaqueList::builder()
        .layout_of::<u32>()
        .teardown(Teardown::from_fn(release))
        .build()
        .unwrap();

    for value in [1_u32, 10, 100] {
        // SAFETY: The list was built for u32.
        unsafe { list.push_back(value) }.unwrap();
    }

    list.pop_front().unwrap();
    assert_eq!(RELEASED.with(Cell::get), 1);

    // SAFETY: The list was built for u32.
    let taken = unsafe { list.take_back::<u32>() };
    assert_eq!(taken, Some(100));
    assert_eq!(RELEASED.with(Cell::get), 1);

    drop(list);
    assert_eq!(RELEASED.with(Cell::get), 11);
}

#[test]
fn hash_table_tears_down_each_value_once() {
    let value_drops = Rc::new(Cell::new(0));

    let mut table = OpaqueHashTable::builder()
        .key_traits_of::<u32>()
        .value_layout_of::<Tracked>()
        .bucket_count(3)
        .build()
        .unwrap();

    let key_count = u32::try_from(ITEM_COUNT).unwrap();

    // SAFETY: Keys are u32 and values are Tracked, as configured.
    unsafe {
        for key in 0..key_count {
            table.insert(key, Tracked::new(&value_drops)).unwrap();
        }

        // Every replacement releases exactly one old value.
        for key in 0..key_count {
            table.insert(key, Tracked::new(&value_drops)).unwrap();
        }
        assert_eq!(value_drops.get(), ITEM_COUNT);

        for key in (0..key_count).step_by(2) {
            table.remove(&key).unwrap();
        }
    }

    assert_eq!(value_drops.get(), ITEM_COUNT + ITEM_COUNT.div_ceil(2));

    drop(table);
    assert_eq!(value_drops.get(), 2 * ITEM_COUNT);
}

#[test]
fn hash_table_with_tracked_keys() {
    fn hash_tracked(_key: &Tracked) -> usize {
        0
    }

    fn never_equal(_a: &Tracked, _b: &Tracked) -> bool {
        false
    }

    let key_drops = Rc::new(Cell::new(0));

    let mut table = OpaqueHashTable::builder()
        .key_layout_of::<Tracked>()
        .hash_fn(hash_tracked)
        .compare_fn(never_equal)
        .value_layout_of::<u8>()
        .build()
        .unwrap();

    // SAFETY: Keys are Tracked and values are u8, as configured.
    unsafe {
        for value in 0..10_u8 {
            table.insert(Tracked::new(&key_drops), value).unwrap();
        }
    }

    assert_eq!(table.len(), 10);

    table.clear();
    assert_eq!(key_drops.get(), 10);
    assert!(table.is_empty());
}
