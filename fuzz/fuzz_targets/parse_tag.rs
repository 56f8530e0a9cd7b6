//! Fuzz session tag parsing.
//!
//! Any input either fails to parse or yields a tag whose display form
//! parses back to an equal tag.

#![no_main]

use libfuzzer_sys::fuzz_target;
use oradb_pool::Tag;

fuzz_target!(|data: &str| {
    let Ok(tag) = data.parse::<Tag>() else {
        return;
    };
    let displayed = tag.to_string();
    let reparsed: Tag = match displayed.parse() {
        Ok(tag) => tag,
        Err(e) => panic!("display form {displayed:?} does not parse: {e}"),
    };
    assert_eq!(reparsed, tag);
});
