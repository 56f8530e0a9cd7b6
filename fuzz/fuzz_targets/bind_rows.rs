//! Fuzz batch binding: rows of mixed values must bind or fail cleanly.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use oradb_types::{BindArena, BindValue, Capabilities};

#[derive(Debug, Arbitrary)]
enum Cell {
    Null,
    Integer(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<Cell> for BindValue {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Null => BindValue::Null,
            Cell::Integer(n) => BindValue::Integer(n),
            Cell::Text(s) => BindValue::from(s),
            Cell::Bytes(b) => BindValue::Bytes(b.into()),
        }
    }
}

fuzz_target!(|batches: Vec<Vec<Vec<Cell>>>| {
    let mut arena = BindArena::new(Capabilities::default(), false);
    for rows in batches.into_iter().take(8) {
        let rows: Vec<Vec<BindValue>> = rows
            .into_iter()
            .take(64)
            .map(|row| row.into_iter().take(8).map(BindValue::from).collect())
            .collect();
        if arena.bind_rows(&rows).is_ok() {
            assert_eq!(arena.num_rows() as usize, rows.len());
        }
    }
});
