use proptest::prelude::*;
use dapp_core::{CommandKind, InterestSet};

fn any_kind() -> impl Strategy<Value = CommandKind> {
    (0..CommandKind::ALL.len()).prop_map(|i| CommandKind::ALL[i])
}

proptest! {
    /// Every catalog entry is found again by its own code.
    #[test]
    fn prop_lookup_inverts_code(kind in any_kind()) {
        prop_assert_eq!(CommandKind::by_index(kind.code()), Some(kind));
        prop_assert_eq!(CommandKind::try_from(kind.code()), Ok(kind));
        prop_assert_eq!(kind.as_str().parse::<CommandKind>(), Ok(kind));
    }

    /// Codes outside 1..=16 are unknown, never an error or a panic.
    #[test]
    fn prop_out_of_range_codes_are_unknown(code in any::<u32>()) {
        prop_assume!(!(1..=16).contains(&code));
        prop_assert_eq!(CommandKind::by_index(code), None);
        prop_assert!(CommandKind::try_from(code).is_err());
    }

    /// An interest set contains exactly the kinds it was built from.
    #[test]
    fn prop_interest_set_membership(kinds in proptest::collection::vec(any_kind(), 0..20)) {
        let set: InterestSet = kinds.iter().copied().collect();
        for kind in CommandKind::ALL {
            prop_assert_eq!(set.contains(kind), kinds.contains(&kind));
        }
        let mut unique = kinds.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(set.len(), unique.len());
        prop_assert_eq!(set.iter().collect::<Vec<_>>(), unique);
    }
}
