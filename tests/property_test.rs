// tests/property_test.rs

//! Property-based tests for the key prefix/suffix derivation rules that
//! drive sharding and map_from_n grouping.

use proptest::prelude::*;
use s4::core::key;

proptest! {
    #[test]
    fn prefix_of_digit_prefixed_name_is_the_digits(digits in "[0-9]{1,6}", rest in "[a-z]{1,10}") {
        let basename = format!("{digits}_{rest}");
        prop_assert_eq!(key::prefix(&basename), digits.as_str());
    }

    #[test]
    fn prefix_of_non_digit_name_is_the_whole_basename(basename in "[a-z]{1,12}") {
        prop_assert_eq!(key::prefix(&basename), basename.as_str());
    }

    #[test]
    fn suffix_and_prefix_reconstruct_the_basename(digits in "[0-9]{1,6}", rest in "[a-zA-Z0-9]{1,10}") {
        let basename = format!("{digits}_{rest}");
        let prefix = key::prefix(&basename);
        let suffix = key::suffix(&basename).unwrap();
        prop_assert_eq!(format!("{prefix}_{suffix}"), basename);
    }

    #[test]
    fn common_suffix_of_shared_tail_group_matches_every_member(
        prefixes in prop::collection::vec("[0-9]{1,4}", 2..8),
        rest in "[a-z]{1,10}",
    ) {
        let basenames: Vec<String> = prefixes.iter().map(|p| format!("{p}_{rest}")).collect();
        let refs: Vec<&str> = basenames.iter().map(|s| s.as_str()).collect();
        prop_assert_eq!(key::common_suffix(refs), format!("_{rest}"));
    }

    #[test]
    fn common_suffix_is_empty_when_any_member_lacks_a_numeric_prefix(
        basename in "[a-z]{1,10}",
        sibling in "[0-9]{1,4}_[a-z]{1,10}",
    ) {
        prop_assert_eq!(key::common_suffix([basename.as_str(), sibling.as_str()]), String::new());
    }
}
