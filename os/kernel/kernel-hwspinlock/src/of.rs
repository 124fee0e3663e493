//! Device-tree style configuration lookups.
//!
//! The hwspinlock core only needs a handful of properties:
//!
//! * `hwlock-base-id` and `hwlock-num-locks` on a bank's node, and
//! * the `hwlocks` reference list on a consumer node, whose entries are a
//!   provider phandle followed by `#hwlock-cells` argument cells.
//!
//! Property access is abstracted by [`PropertyStore`] and [`PhandleResolver`];
//! [`DeviceNode`] and [`DeviceTree`] are simple in-memory implementations.
//! Values are stored the way a flattened device tree stores them: big-endian
//! 32-bit cells and NUL-terminated strings.

use crate::HwSpinlockError;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::num::NonZeroU32;

pub const BASE_ID_PROPERTY: &str = "hwlock-base-id";
pub const NUM_LOCKS_PROPERTY: &str = "hwlock-num-locks";
pub const HWLOCKS_PROPERTY: &str = "hwlocks";
pub const HWLOCK_CELLS_PROPERTY: &str = "#hwlock-cells";
pub const COMPATIBLE_PROPERTY: &str = "compatible";

const CELL_SIZE: usize = size_of::<u32>();

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("property not found")]
    NotFound,
    #[error("property has no value")]
    NoData,
    #[error("property value is too short")]
    Overflow,
}

/// Read access to the properties of one configuration node.
pub trait PropertyStore {
    /// Raw value of the property `name`, if present.
    fn property(&self, name: &str) -> Option<&[u8]>;

    /// Reads the first 32-bit cell of `name`.
    ///
    /// # Errors
    /// * [`PropertyError::NotFound`] if the property is absent.
    /// * [`PropertyError::NoData`] if it is present but empty.
    /// * [`PropertyError::Overflow`] if it is shorter than one cell.
    fn read_u32(&self, name: &str) -> Result<u32, PropertyError> {
        let raw = self.property(name).ok_or(PropertyError::NotFound)?;
        match raw {
            [] => Err(PropertyError::NoData),
            [a, b, c, d, ..] => Ok(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => Err(PropertyError::Overflow),
        }
    }

    /// Reads the whole property as a list of 32-bit cells.
    ///
    /// # Errors
    /// As [`read_u32`](Self::read_u32); a length that is not a multiple of a
    /// cell is reported as [`PropertyError::Overflow`].
    fn read_u32_array(&self, name: &str) -> Result<Vec<u32>, PropertyError> {
        let raw = self.property(name).ok_or(PropertyError::NotFound)?;
        if raw.is_empty() {
            return Err(PropertyError::NoData);
        }
        if raw.len() % CELL_SIZE != 0 {
            return Err(PropertyError::Overflow);
        }
        Ok(raw
            .chunks_exact(CELL_SIZE)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Reads the first string of `name`.
    ///
    /// # Errors
    /// * [`PropertyError::NotFound`] if the property is absent.
    /// * [`PropertyError::NoData`] if it is empty or not valid UTF-8.
    fn read_string(&self, name: &str) -> Result<&str, PropertyError> {
        let raw = self.property(name).ok_or(PropertyError::NotFound)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        match core::str::from_utf8(&raw[..end]) {
            Ok(s) if !s.is_empty() => Ok(s),
            _ => Err(PropertyError::NoData),
        }
    }
}

/// Looks up the number of argument cells a provider expects after its phandle.
pub trait PhandleResolver {
    /// # Errors
    /// [`PropertyError::NotFound`] if no node carries `phandle`, otherwise the
    /// error of reading `cells_name` on that node.
    fn cells_for(&self, phandle: u32, cells_name: &str) -> Result<u32, PropertyError>;
}

/// Reads the global id of a bank's first lock.
///
/// Zero is a valid base id. A missing or malformed property is reported with
/// the property layer's own error.
///
/// # Errors
/// The [`PropertyError`] of reading [`BASE_ID_PROPERTY`], unchanged.
pub fn lookup_base_id(node: &dyn PropertyStore) -> Result<u32, PropertyError> {
    node.read_u32(BASE_ID_PROPERTY)
}

/// Reads the number of locks of a bank.
///
/// A missing property and an explicit count of zero are the same outcome.
///
/// # Errors
/// * [`HwSpinlockError::NoDevice`] if the property is absent or zero.
/// * [`HwSpinlockError::Property`] if it is present but malformed.
pub fn lookup_num_locks(node: &dyn PropertyStore) -> Result<NonZeroU32, HwSpinlockError> {
    match node.read_u32(NUM_LOCKS_PROPERTY) {
        Ok(count) => NonZeroU32::new(count).ok_or(HwSpinlockError::NoDevice),
        Err(PropertyError::NotFound) => Err(HwSpinlockError::NoDevice),
        Err(e) => Err(e.into()),
    }
}

/// One decoded entry of a phandle reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhandleArgs {
    pub phandle: u32,
    pub args: Vec<u32>,
}

/// Decodes every entry of the reference list `list`.
fn phandle_entries(
    node: &dyn PropertyStore,
    list: &str,
    cells_name: &str,
    resolver: &dyn PhandleResolver,
) -> Result<Vec<PhandleArgs>, PropertyError> {
    let cells = node.read_u32_array(list)?;
    let mut entries = Vec::new();
    let mut i = 0;
    while i < cells.len() {
        let phandle = cells[i];
        i += 1;

        // A zero phandle is an empty placeholder entry without arguments.
        let count = if phandle == 0 {
            0
        } else {
            resolver.cells_for(phandle, cells_name)? as usize
        };

        let args = cells
            .get(i..i + count)
            .ok_or(PropertyError::Overflow)?
            .to_vec();
        i += count;
        entries.push(PhandleArgs { phandle, args });
    }
    Ok(entries)
}

/// Counts the entries of a phandle reference list.
///
/// # Errors
/// Property errors of the list itself or of a provider's cell count.
pub fn count_phandle_with_args(
    node: &dyn PropertyStore,
    list: &str,
    cells_name: &str,
    resolver: &dyn PhandleResolver,
) -> Result<usize, PropertyError> {
    phandle_entries(node, list, cells_name, resolver).map(|e| e.len())
}

/// Decodes the `index`-th entry of a phandle reference list.
///
/// # Errors
/// [`PropertyError::NotFound`] if `index` is past the end or the entry is an
/// empty placeholder, otherwise as [`count_phandle_with_args`].
pub fn parse_phandle_with_args(
    node: &dyn PropertyStore,
    list: &str,
    cells_name: &str,
    index: usize,
    resolver: &dyn PhandleResolver,
) -> Result<PhandleArgs, PropertyError> {
    phandle_entries(node, list, cells_name, resolver)?
        .into_iter()
        .nth(index)
        .filter(|e| e.phandle != 0)
        .ok_or(PropertyError::NotFound)
}

/// Translates a reference with exactly one argument cell into a local lock index.
///
/// # Errors
/// [`HwSpinlockError::InvalidArgument`] for any other argument count.
pub fn simple_xlate(spec: &PhandleArgs) -> Result<u32, HwSpinlockError> {
    match spec.args.as_slice() {
        [local_id] => Ok(*local_id),
        _ => Err(HwSpinlockError::InvalidArgument),
    }
}

/// An in-memory configuration node.
#[derive(Debug, Clone, Default)]
pub struct DeviceNode {
    name: String,
    phandle: Option<u32>,
    properties: BTreeMap<String, Vec<u8>>,
}

impl DeviceNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn phandle(&self) -> Option<u32> {
        self.phandle
    }

    #[must_use]
    pub fn with_phandle(mut self, phandle: u32) -> Self {
        self.phandle = Some(phandle);
        self.with_u32("phandle", phandle)
    }

    #[must_use]
    pub fn with_u32(self, name: &str, value: u32) -> Self {
        self.with_cells(name, &[value])
    }

    #[must_use]
    pub fn with_cells(self, name: &str, cells: &[u32]) -> Self {
        let raw = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        self.with_raw(name, raw)
    }

    #[must_use]
    pub fn with_string(self, name: &str, value: &str) -> Self {
        let mut raw = Vec::with_capacity(value.len() + 1);
        raw.extend_from_slice(value.as_bytes());
        raw.push(0);
        self.with_raw(name, raw)
    }

    /// Stores an arbitrary raw value, e.g. an empty or truncated property.
    #[must_use]
    pub fn with_raw(mut self, name: &str, raw: Vec<u8>) -> Self {
        self.properties.insert(String::from(name), raw);
        self
    }
}

impl PropertyStore for DeviceNode {
    fn property(&self, name: &str) -> Option<&[u8]> {
        self.properties.get(name).map(Vec::as_slice)
    }
}

/// A flat collection of nodes, addressable by phandle.
#[derive(Debug, Clone, Default)]
pub struct DeviceTree {
    nodes: Vec<DeviceNode>,
}

impl DeviceTree {
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    #[must_use]
    pub fn with_node(mut self, node: DeviceNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add(&mut self, node: DeviceNode) {
        self.nodes.push(node);
    }

    #[must_use]
    pub fn by_phandle(&self, phandle: u32) -> Option<&DeviceNode> {
        self.nodes.iter().find(|n| n.phandle == Some(phandle))
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&DeviceNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

impl PhandleResolver for DeviceTree {
    fn cells_for(&self, phandle: u32, cells_name: &str) -> Result<u32, PropertyError> {
        self.by_phandle(phandle)
            .ok_or(PropertyError::NotFound)?
            .read_u32(cells_name)
    }
}
