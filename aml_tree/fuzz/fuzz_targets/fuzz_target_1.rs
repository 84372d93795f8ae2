#![no_main]
use libfuzzer_sys::fuzz_target;
extern crate aml_tree;

use std::sync::atomic::{AtomicBool, Ordering};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

fuzz_target!(|data: &[u8]| {
    if let Ok(false) = INITIALIZED.compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed) {
        simplelog::SimpleLogger::init(simplelog::LevelFilter::Trace, simplelog::Config::default()).unwrap();
    }

    let options = aml_tree::ParseOptions { validate_checksum: false, ..aml_tree::ParseOptions::default() };
    if let Ok((mut tree, root)) = aml_tree::parse_definition_block(data, &options) {
        /*
         * Anything that parses must serialize again, and come back out the same.
         */
        let serialized = tree.serialize_definition_block(root).unwrap();
        let (mut reparsed, reparsed_root) = aml_tree::parse_definition_block(&serialized, &options).unwrap();
        assert_eq!(reparsed.serialize_definition_block(reparsed_root).unwrap(), serialized);
        tree.delete_tree(root).unwrap();
    }
});
