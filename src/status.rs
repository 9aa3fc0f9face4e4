//! Named predicates over native status words and flag fields.
//!
//! Raw integers stay private; callers only see the predicates.

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::error::DecodeError;

/// Bits per status word.
pub const INTEGER_BITS: usize = 32;

/// Number of words needed for one bit per load index.
pub fn get_intnum(num_indices: usize) -> usize {
    num_indices / INTEGER_BITS + 1
}

pub mod lim {
    pub const UNAVAIL: u32 = 0x0001_0000;
    pub const LOCKEDU: u32 = 0x0002_0000;
    pub const LOCKEDW: u32 = 0x0004_0000;
    pub const BUSY: u32 = 0x0008_0000;
    pub const RESDOWN: u32 = 0x0010_0000;
    pub const UNLICENSED: u32 = 0x0020_0000;
    pub const SBDDOWN: u32 = 0x0040_0000;
    pub const LOCKEDM: u32 = 0x0080_0000;
    pub const OK_MASK: u32 = 0x00bf_0000;
    pub const PEMDOWN: u32 = 0x0100_0000;
    pub const LOCKEDU_RMS: u32 = 0x8000_0000;
}

/// Option bits accepted by the host and load queries.
pub mod options {
    pub const EXACT: i32 = 0x01;
    pub const OK_ONLY: i32 = 0x02;
    pub const NORMALIZE: i32 = 0x04;
    pub const LOCALITY: i32 = 0x08;
    pub const IGNORE_RES: i32 = 0x10;
    pub const LOCAL_ONLY: i32 = 0x20;
    pub const DFT_FROMTYPE: i32 = 0x40;
    pub const ALL_CLUSTERS: i32 = 0x80;
    pub const EFFECTIVE: i32 = 0x100;
}

/// Host status as reported with load information.
///
/// Word 0 carries the LIM flags; words `1..` carry one busy bit per load
/// index. A host whose server sent no status array answers `false` to
/// every predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatus {
    words: Option<Vec<u32>>,
    num_indices: usize,
}

impl HostStatus {
    pub fn new(words: Vec<u32>, num_indices: usize) -> Self {
        Self { words: Some(words), num_indices }
    }

    pub fn absent(num_indices: usize) -> Self {
        Self { words: None, num_indices }
    }

    pub fn is_reported(&self) -> bool {
        self.words.is_some()
    }

    fn flags(&self, mask: u32) -> bool {
        match self.words.as_deref() {
            Some([first, ..]) => first & mask != 0,
            _ => false,
        }
    }

    pub fn is_unavail(&self) -> bool {
        self.flags(lim::UNAVAIL)
    }

    pub fn is_busy(&self) -> bool {
        self.flags(lim::BUSY)
    }

    pub fn is_rms_locked(&self) -> bool {
        self.flags(lim::LOCKEDU_RMS)
    }

    pub fn is_locked_user(&self) -> bool {
        self.flags(lim::LOCKEDU)
    }

    pub fn is_locked_window(&self) -> bool {
        self.flags(lim::LOCKEDW)
    }

    pub fn is_locked_master(&self) -> bool {
        self.flags(lim::LOCKEDM)
    }

    pub fn is_locked(&self) -> bool {
        self.flags(lim::LOCKEDU | lim::LOCKEDW | lim::LOCKEDM)
    }

    pub fn is_res_down(&self) -> bool {
        self.flags(lim::RESDOWN)
    }

    pub fn is_sbd_down(&self) -> bool {
        self.flags(lim::SBDDOWN)
    }

    pub fn is_pem_down(&self) -> bool {
        self.flags(lim::PEMDOWN)
    }

    pub fn is_unlicensed(&self) -> bool {
        self.flags(lim::UNLICENSED)
    }

    pub fn is_ok(&self) -> bool {
        match self.words.as_deref() {
            Some([first, ..]) => first & lim::OK_MASK == 0,
            _ => false,
        }
    }

    /// OK apart from the resource, batch and process managers being down.
    pub fn is_ok_no_res(&self) -> bool {
        match self.words.as_deref() {
            Some([first, ..]) => {
                let ignored = lim::LOCKEDU_RMS | lim::RESDOWN | lim::SBDDOWN | lim::PEMDOWN;
                first & !ignored == 0
            }
            _ => false,
        }
    }

    /// Whether the host is busy on load index `index`.
    pub fn is_busy_on(&self, index: usize) -> Result<bool, DecodeError> {
        if index >= self.num_indices {
            return Err(DecodeError::InvalidIndex { index, limit: self.num_indices });
        }
        let Some(words) = &self.words else {
            return Ok(false);
        };
        let word = words.get(1 + index / INTEGER_BITS).copied().unwrap_or(0);
        Ok(word & (1 << (index % INTEGER_BITS)) != 0)
    }

    /// Load indices on which the host is busy.
    pub fn busy_indices(&self) -> Vec<usize> {
        (0..self.num_indices)
            .filter(|&i| self.is_busy_on(i).unwrap_or(false))
            .collect()
    }

    /// Names of the set condition flags, in a fixed order.
    pub fn names(&self) -> Vec<&'static str> {
        if !self.is_reported() {
            return Vec::new();
        }
        let checks: [(&'static str, bool); 11] = [
            ("ok", self.is_ok()),
            ("unavail", self.is_unavail()),
            ("busy", self.is_busy()),
            ("lockU", self.is_locked_user()),
            ("lockW", self.is_locked_window()),
            ("lockM", self.is_locked_master()),
            ("lockRMS", self.is_rms_locked()),
            ("resDown", self.is_res_down()),
            ("sbdDown", self.is_sbd_down()),
            ("pemDown", self.is_pem_down()),
            ("unlicensed", self.is_unlicensed()),
        ];
        checks.iter().filter(|(_, set)| *set).map(|(name, _)| *name).collect()
    }
}

impl Serialize for HostStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

/// Status of a cluster as seen from the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterStatus(i32);

impl ClusterStatus {
    pub const OK: i32 = 0x01;
    pub const UNAVAIL: i32 = 0x02;
    pub const RECV_FROM: i32 = 0x04;
    pub const SEND_TO: i32 = 0x08;

    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn is_ok(self) -> bool {
        self.0 & Self::OK != 0
    }

    pub fn is_unavail(self) -> bool {
        self.0 & Self::UNAVAIL != 0
    }

    pub fn receives_from(self) -> bool {
        self.0 & Self::RECV_FROM != 0
    }

    pub fn sends_to(self) -> bool {
        self.0 & Self::SEND_TO != 0
    }

    pub fn names(self) -> Vec<&'static str> {
        [
            ("ok", self.is_ok()),
            ("unavail", self.is_unavail()),
            ("recvFrom", self.receives_from()),
            ("sendTo", self.sends_to()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

impl Serialize for ClusterStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

/// Resource definition flags from `resItem.flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceFlags(i32);

impl ResourceFlags {
    pub const BUILTIN: i32 = 0x01;
    pub const DYNAMIC: i32 = 0x02;
    pub const GLOBAL: i32 = 0x04;
    pub const SHARED: i32 = 0x08;
    pub const LIC: i32 = 0x10;
    pub const EXTERNAL: i32 = 0x20;
    pub const RELEASE: i32 = 0x40;
    pub const DEFINED_IN_RESOURCEMAP: i32 = 0x80;
    pub const NON_CONSUMABLE: i32 = 0x100;
    pub const REDEFINABLE: i32 = 0x200;
    pub const ESRES: i32 = 0x400;

    const NAMES: [(i32, &'static str); 11] = [
        (Self::BUILTIN, "builtin"),
        (Self::DYNAMIC, "dynamic"),
        (Self::GLOBAL, "global"),
        (Self::SHARED, "shared"),
        (Self::LIC, "license"),
        (Self::EXTERNAL, "external"),
        (Self::RELEASE, "release"),
        (Self::DEFINED_IN_RESOURCEMAP, "resourcemap"),
        (Self::NON_CONSUMABLE, "nonConsumable"),
        (Self::REDEFINABLE, "redefinable"),
        (Self::ESRES, "esres"),
    ];

    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    fn has(self, flag: i32) -> bool {
        self.0 & flag != 0
    }

    pub fn is_builtin(self) -> bool {
        self.has(Self::BUILTIN)
    }

    pub fn is_dynamic(self) -> bool {
        self.has(Self::DYNAMIC)
    }

    pub fn is_global(self) -> bool {
        self.has(Self::GLOBAL)
    }

    pub fn is_shared(self) -> bool {
        self.has(Self::SHARED)
    }

    pub fn is_license(self) -> bool {
        self.has(Self::LIC)
    }

    pub fn is_external(self) -> bool {
        self.has(Self::EXTERNAL)
    }

    pub fn is_release(self) -> bool {
        self.has(Self::RELEASE)
    }

    pub fn is_non_consumable(self) -> bool {
        self.has(Self::NON_CONSUMABLE)
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.has(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Serialize for ResourceFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

/// License feature bitmap (`licFeaturesNeeded`, `defaultFeatures`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseFeatures(i32);

impl LicenseFeatures {
    pub const LSF_BASE: u32 = 0;
    pub const CLUSTERWARE_MANAGER: u32 = 20;
    pub const LSF_MANAGER: u32 = 21;
    pub const SYMPHONY_MANAGER_ONLINE: u32 = 25;
    pub const SYMPHONY_MANAGER_BATCH: u32 = 26;
    pub const LSF_WORKGROUP: u32 = 30;

    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn has(self, feature: u32) -> bool {
        feature < 32 && (self.0 as u32) & (1 << feature) != 0
    }

    pub fn has_batch(self) -> bool {
        [
            Self::CLUSTERWARE_MANAGER,
            Self::LSF_MANAGER,
            Self::LSF_WORKGROUP,
            Self::SYMPHONY_MANAGER_ONLINE,
            Self::SYMPHONY_MANAGER_BATCH,
        ]
        .into_iter()
        .any(|f| self.has(f))
    }

    pub fn has_symphony(self) -> bool {
        self.has(Self::SYMPHONY_MANAGER_ONLINE) || self.has(Self::SYMPHONY_MANAGER_BATCH)
    }

    /// Indices of the enabled features.
    pub fn features(self) -> Vec<u32> {
        (0..32).filter(|&f| self.has(f)).collect()
    }
}

impl Serialize for LicenseFeatures {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.features())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Numeric,
    String,
    External,
    #[serde(untagged)]
    Unknown(i32),
}

impl From<i32> for ValueType {
    fn from(raw: i32) -> Self {
        match raw {
            0 => ValueType::Boolean,
            1 => ValueType::Numeric,
            2 => ValueType::String,
            3 => ValueType::External,
            other => ValueType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Increasing,
    Decreasing,
    #[serde(rename = "na")]
    NotApplicable,
    #[serde(untagged)]
    Unknown(i32),
}

impl From<i32> for OrderType {
    fn from(raw: i32) -> Self {
        match raw {
            0 => OrderType::Increasing,
            1 => OrderType::Decreasing,
            2 => OrderType::NotApplicable,
            other => OrderType::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_locked() {
        for mask in [lim::LOCKEDU, lim::LOCKEDW, lim::LOCKEDM, lim::LOCKEDU | lim::BUSY] {
            assert!(HostStatus::new(vec![mask], 0).is_locked(), "{mask:#x}");
        }
        for mask in [0, lim::BUSY, lim::UNAVAIL, lim::LOCKEDU_RMS] {
            assert!(!HostStatus::new(vec![mask], 0).is_locked(), "{mask:#x}");
        }
    }

    #[test]
    fn test_busy_on_reads_word_and_bit() {
        // k = 40 lives in word 1 + 40 / 32 = 2, bit 40 % 32 = 8
        let status = HostStatus::new(vec![0, 0, 1 << 8], 64);
        assert!(status.is_busy_on(40).unwrap());
        assert!(!status.is_busy_on(8).unwrap());
        assert!(!status.is_busy_on(41).unwrap());
        assert_eq!(status.busy_indices(), vec![40]);
    }

    #[test]
    fn test_busy_on_out_of_range() {
        let status = HostStatus::new(vec![0, u32::MAX], 11);
        assert!(status.is_busy_on(10).unwrap());
        assert_eq!(status.is_busy_on(11), Err(DecodeError::InvalidIndex { index: 11, limit: 11 }));
        assert_eq!(status.is_busy_on(usize::MAX), Err(DecodeError::InvalidIndex { index: usize::MAX, limit: 11 }));
    }

    #[test]
    fn test_absent_status_is_false() {
        let status = HostStatus::absent(11);
        assert!(!status.is_ok());
        assert!(!status.is_ok_no_res());
        assert!(!status.is_unavail());
        assert!(!status.is_locked());
        assert!(!status.is_busy_on(3).unwrap());
        assert!(status.names().is_empty());
        assert_eq!(serde_json::to_string(&status).unwrap(), "[]");
    }

    #[test]
    fn test_ok_predicates() {
        assert!(HostStatus::new(vec![0], 0).is_ok());
        assert!(!HostStatus::new(vec![lim::BUSY], 0).is_ok());
        // PEMDOWN and the RMS lock are outside the OK mask
        assert!(HostStatus::new(vec![lim::PEMDOWN | lim::LOCKEDU_RMS], 0).is_ok());

        let degraded = HostStatus::new(vec![lim::RESDOWN | lim::SBDDOWN | lim::PEMDOWN], 0);
        assert!(!degraded.is_ok());
        assert!(degraded.is_ok_no_res());
        assert!(!HostStatus::new(vec![lim::RESDOWN | lim::BUSY], 0).is_ok_no_res());
    }

    #[test]
    fn test_status_names() {
        let status = HostStatus::new(vec![lim::UNAVAIL | lim::LOCKEDW], 0);
        assert_eq!(status.names(), vec!["unavail", "lockW"]);
        assert_eq!(serde_json::to_string(&status).unwrap(), r#"["unavail","lockW"]"#);
    }

    #[test]
    fn test_cluster_status() {
        let status = ClusterStatus::new(ClusterStatus::OK | ClusterStatus::SEND_TO);
        assert!(status.is_ok());
        assert!(status.sends_to());
        assert!(!status.receives_from());
        assert_eq!(status.names(), vec!["ok", "sendTo"]);
    }

    #[test]
    fn test_resource_flags() {
        let flags = ResourceFlags::new(ResourceFlags::BUILTIN | ResourceFlags::SHARED | 0x100);
        assert!(flags.is_builtin());
        assert!(flags.is_shared());
        assert!(flags.is_non_consumable());
        assert!(!flags.is_dynamic());
        assert_eq!(flags.names(), vec!["builtin", "shared", "nonConsumable"]);
    }

    #[test]
    fn test_license_features() {
        assert!(LicenseFeatures::new(1 << 21).has_batch());
        assert!(LicenseFeatures::new(1 << 30).has_batch());
        assert!(!LicenseFeatures::new(1 << 21).has_symphony());
        assert!(LicenseFeatures::new(1 << 26).has_symphony());
        assert!(!LicenseFeatures::new(0b111).has_batch());
        assert_eq!(LicenseFeatures::new(0b101).features(), vec![0, 2]);
    }

    #[test]
    fn test_value_and_order_types() {
        assert_eq!(ValueType::from(1), ValueType::Numeric);
        assert_eq!(ValueType::from(9), ValueType::Unknown(9));
        assert_eq!(OrderType::from(2), OrderType::NotApplicable);
        assert_eq!(serde_json::to_string(&OrderType::Decreasing).unwrap(), r#""decreasing""#);
        assert_eq!(serde_json::to_string(&OrderType::NotApplicable).unwrap(), r#""na""#);
        assert_eq!(serde_json::to_string(&ValueType::Unknown(9)).unwrap(), "9");
    }

    #[test]
    fn test_get_intnum() {
        assert_eq!(get_intnum(11), 1);
        assert_eq!(get_intnum(32), 2);
        assert_eq!(get_intnum(40), 2);
    }
}
