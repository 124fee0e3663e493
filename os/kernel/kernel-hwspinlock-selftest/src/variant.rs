use crate::SelftestError;
use alloc::string::ToString;
use kernel_hwspinlock::of::{COMPATIBLE_PROPERTY, PropertyError, PropertyStore};

/// A supported test node flavor and the number of locks its SoC implements.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TestVariant {
    pub compatible: &'static str,
    pub max_locks: u32,
}

pub const TEST_VARIANTS: &[TestVariant] = &[
    TestVariant {
        compatible: "ti,omap4-hwspinlock-test",
        max_locks: 32,
    },
    TestVariant {
        compatible: "ti,omap5-hwspinlock-test",
        max_locks: 32,
    },
    TestVariant {
        compatible: "ti,dra7-hwspinlock-test",
        max_locks: 256,
    },
    TestVariant {
        compatible: "ti,am33xx-hwspinlock-test",
        max_locks: 128,
    },
    TestVariant {
        compatible: "ti,am43xx-hwspinlock-test",
        max_locks: 128,
    },
];

/// Looks up a variant by its exact compatible string.
#[must_use]
pub fn lookup(compatible: &str) -> Option<&'static TestVariant> {
    TEST_VARIANTS.iter().find(|v| v.compatible == compatible)
}

/// Matches the node's `compatible` list, most specific entry first.
///
/// # Errors
/// * [`SelftestError::MissingCompatible`] if the property is absent or empty.
/// * [`SelftestError::UnknownVariant`] if no entry is in [`TEST_VARIANTS`].
pub fn match_node(node: &dyn PropertyStore) -> Result<&'static TestVariant, SelftestError> {
    let raw = node
        .property(COMPATIBLE_PROPERTY)
        .ok_or(SelftestError::MissingCompatible(PropertyError::NotFound))?;

    let mut entries = raw
        .split(|&b| b == 0)
        .filter_map(|s| core::str::from_utf8(s).ok())
        .filter(|s| !s.is_empty())
        .peekable();

    let Some(&first) = entries.peek() else {
        return Err(SelftestError::MissingCompatible(PropertyError::NoData));
    };

    entries
        .find_map(lookup)
        .ok_or_else(|| SelftestError::UnknownVariant(first.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use kernel_hwspinlock::of::DeviceNode;

    #[test]
    fn table_matches_known_socs() {
        let counts: Vec<u32> = TEST_VARIANTS.iter().map(|v| v.max_locks).collect();
        assert_eq!(counts, [32, 32, 256, 128, 128]);
        assert_eq!(lookup("ti,dra7-hwspinlock-test").unwrap().max_locks, 256);
        assert!(lookup("ti,omap3-hwspinlock-test").is_none());
    }

    #[test]
    fn matches_later_entries_of_a_compatible_list() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"vendor,board-hwspinlock-test\0ti,am43xx-hwspinlock-test\0");
        let node = DeviceNode::new("test").with_raw(COMPATIBLE_PROPERTY, raw);
        assert_eq!(match_node(&node).unwrap().max_locks, 128);
    }

    #[test]
    fn reports_missing_and_unknown_compatibles() {
        assert_eq!(
            match_node(&DeviceNode::new("test")),
            Err(SelftestError::MissingCompatible(PropertyError::NotFound))
        );
        let empty = DeviceNode::new("test").with_raw(COMPATIBLE_PROPERTY, Vec::new());
        assert_eq!(
            match_node(&empty),
            Err(SelftestError::MissingCompatible(PropertyError::NoData))
        );
        let unknown = DeviceNode::new("test").with_string(COMPATIBLE_PROPERTY, "acme,lock");
        assert_eq!(
            match_node(&unknown),
            Err(SelftestError::UnknownVariant("acme,lock".to_string()))
        );
    }
}
