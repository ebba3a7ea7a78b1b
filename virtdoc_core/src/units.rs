use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;
use virtdoc_common::{AppConfig, VirtDocError};

/// Byte literal (`b`, `byte`, `bytes`) or scale letter with optional binary marker (`k`, `kb`, `kib`)
const UNIT_PATTERN: &str = r"^(?:(?P<byte>b)(?:ytes?)?|(?P<scale>[kmgtpe])(?:(?P<binary>i?)b)?)$";

/// Unit written into normalized quantities
pub const BYTE_UNIT: &str = "b";

static UNIT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(UNIT_PATTERN).unwrap()
});

/// Convert `magnitude` expressed in `unit` to a byte count.
///
/// Tokens are matched case-insensitively against the whole string. A scale
/// letter alone or followed by `b` is decimal (`kb` = 1000), with an `i`
/// marker it is binary (`kib` = 1024).
pub fn to_bytes(magnitude: u64, unit: &str) -> Result<u128, VirtDocError> {
    let token = unit.to_ascii_lowercase();
    let caps = UNIT_TOKEN
        .captures(&token)
        .ok_or_else(|| VirtDocError::invalid_unit(unit))?;

    if caps.name("byte").is_some() {
        return Ok(u128::from(magnitude));
    }

    let scale = match caps.name("scale").map(|m| m.as_str()) {
        Some("k") => 1,
        Some("m") => 2,
        Some("g") => 3,
        Some("t") => 4,
        Some("p") => 5,
        Some("e") => 6,
        _ => return Err(VirtDocError::invalid_unit(unit)),
    };
    let binary = caps.name("binary").map_or(false, |m| !m.as_str().is_empty());
    let base: u128 = if binary { 1024 } else { 1000 };

    Ok(u128::from(magnitude) * base.pow(scale))
}

/// Default unit per kind label, applied when a quantity's unit attribute is empty.
///
/// Only quantities under a registered label are unit-normalized by the comparator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitTable {
    defaults: BTreeMap<String, String>,
}

impl UnitTable {
    pub fn empty() -> Self {
        Self {
            defaults: BTreeMap::new(),
        }
    }

    /// Registers `unit` as the default for `label`, rejecting unknown unit tokens.
    pub fn with_default_unit(
        mut self,
        label: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, VirtDocError> {
        let unit = unit.into();
        to_bytes(1, &unit)?;
        self.defaults.insert(label.into(), unit);
        Ok(self)
    }

    /// Built-in table with the configuration's `units` entries layered on top.
    pub fn from_config(config: &AppConfig) -> Result<Self, VirtDocError> {
        let mut table = Self::default();
        for (label, unit) in &config.units {
            debug!("Registering default unit {} for {}", unit, label);
            table = table.with_default_unit(label.clone(), unit.clone()).map_err(|e| {
                VirtDocError::Config(format!("units.{}: {}", label, e))
            })?;
        }
        Ok(table)
    }

    pub fn default_unit(&self, label: &str) -> Option<&str> {
        self.defaults.get(label).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.defaults.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }
}

impl Default for UnitTable {
    fn default() -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert("domain".to_string(), "KiB".to_string());
        defaults.insert("volume".to_string(), "bytes".to_string());
        Self { defaults }
    }
}
