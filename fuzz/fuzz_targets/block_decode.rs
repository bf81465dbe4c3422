#![no_main]

// Harness: block_decode
// Arbitrary bytes either fail to decode as a block or flatten into exactly
// `command_count` raw commands, each stamped with its transaction's time.

use libfuzzer_sys::fuzz_target;
use dapp_core::Block;

fuzz_target!(|data: &[u8]| {
    if let Ok(block) = serde_json::from_slice::<Block>(data) {
        let raws: Vec<_> = block.raw_commands().collect();
        assert_eq!(raws.len(), block.command_count());

        let mut raws = raws.into_iter();
        for tx in &block.transactions {
            for body in &tx.commands {
                let raw = raws.next().expect("flattened command");
                assert_eq!(raw.code, body.code);
                assert_eq!(raw.created_time, tx.created_time);
            }
        }
    }
});
