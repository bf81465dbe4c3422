#![no_main]

// Harness: catalog_lookup
// Any code resolves to at most one kind, and a resolved kind maps back to
// the same code.

use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use dapp_core::primitives::RawCommand;
use dapp_core::CommandKind;

#[derive(Arbitrary, Debug)]
struct Input {
    code: u32,
    payload: Vec<u8>,
    created_time: u64,
}

fuzz_target!(|input: Input| {
    let raw = RawCommand { code: input.code, payload: input.payload.clone(), created_time: input.created_time };
    match (CommandKind::by_index(input.code), raw.resolve()) {
        (Some(kind), Some(cmd)) => {
            assert_eq!(kind.code(), input.code);
            assert_eq!(cmd.kind, kind);
            assert_eq!(cmd.payload, input.payload);
            assert_eq!(cmd.created_time, input.created_time);
        }
        (None, None) => {}
        other => panic!("lookup and resolve disagree: {:?}", other),
    }
});
