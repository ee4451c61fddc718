//! Walks through the three collections in `opaque_collections`.
//!
//! Debug and trace events emitted by the collections are printed to stdout alongside the
//! example output.

use opaque_collections::{OpaqueArray, OpaqueHashTable, OpaqueList, polynomial_hash};

fn hash_str(key: &&'static str) -> usize {
    polynomial_hash(key.as_bytes())
}

fn eq_str(a: &&'static str, b: &&'static str) -> bool {
    a == b
}

fn array_tour() {
    println!("=== OpaqueArray ===");

    let mut array = OpaqueArray::builder()
        .layout_of::<i32>()
        .initial_capacity(2)
        .build()
        .expect("array configuration is valid");

    for i in 0..5_i32 {
        // SAFETY: The array was built for i32.
        unsafe { array.push_back(i * i) }.expect("allocation succeeds");
    }

    println!("Capacity after 5 pushes: {}", array.capacity());

    array.remove_at(2).expect("index 2 exists");

    // SAFETY: The array was built for i32.
    let items = unsafe { array.as_slice::<i32>() };
    println!("After removing index 2: {items:?}");
    println!();
}

fn list_tour() {
    println!("=== OpaqueList ===");

    let mut list = OpaqueList::builder()
        .layout_of::<u32>()
        .build()
        .expect("list configuration is valid");

    for i in 0..10_u32 {
        // SAFETY: The list was built for u32.
        unsafe { list.push_back(i * i) }.expect("allocation succeeds");
    }

    let removed = list.remove_all_where(|item| {
        // SAFETY: Every item in the list is a u32.
        let value = unsafe { *item.cast::<u32>().as_ref() };
        value % 2 == 1
    });

    // SAFETY: The list was built for u32.
    let remaining: Vec<u32> = unsafe { list.iter::<u32>() }.copied().collect();
    println!("Removed {removed} odd squares, kept {remaining:?}");

    // SAFETY: The list was built for u32.
    let backward: Vec<u32> = unsafe { list.iter::<u32>() }.rev().copied().collect();
    println!("Backward: {backward:?}");
    println!();
}

fn table_tour() {
    println!("=== OpaqueHashTable ===");

    let mut table = OpaqueHashTable::builder()
        .key_layout_of::<&'static str>()
        .hash_fn(hash_str)
        .compare_fn(eq_str)
        .value_layout_of::<&'static str>()
        .build()
        .expect("table configuration is valid");

    // SAFETY: Keys and values are &'static str, as configured.
    unsafe {
        for (key, value) in [("abc", "def"), ("ock", "dlcma"), ("d3q", "lcke")] {
            table.insert(key, value).expect("allocation succeeds");
        }

        println!(
            "abc -> {:?}",
            table.get::<&'static str, &'static str>(&"abc")
        );

        table.remove(&"ock").expect("key was inserted above");
        println!("ock present after removal: {}", table.contains_key(&"ock"));

        if let Err(error) = table.remove(&"ock") {
            println!("Removing ock again: {error}");
        }
    }

    println!(
        "{} entries in {} buckets",
        table.len(),
        table.bucket_count()
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    array_tour();
    list_tour();
    table_tour();
}
