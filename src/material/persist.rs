//! Instance Persistence
//!
//! Serialized form of an instance: its override tables, its static subset,
//! a reference to its parent by asset id, and its identity token. Packaged
//! records additionally carry compiled program bytes per target platform.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::interner;
use crate::material::instance::{BasePropertyOverrides, InstanceKind, MaterialInstance};
use crate::params::{ParameterOverride, ParameterOverrideTable, ParameterValue, StaticParameterSet};
use crate::tiers::{ShaderPlatform, TierPair};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedParameter {
    pub name: String,
    pub value: ParameterValue,
    #[serde(default = "default_true")]
    pub overridden: bool,
    #[serde(default)]
    pub expression_id: Uuid,
}

fn default_true() -> bool {
    true
}

impl SerializedParameter {
    fn capture(entry: &ParameterOverride) -> Self {
        Self {
            name: interner::resolve(entry.name).to_string(),
            value: entry.value,
            overridden: entry.overridden,
            expression_id: entry.expression_id,
        }
    }

    fn to_entry(&self) -> ParameterOverride {
        ParameterOverride {
            name: interner::intern(&self.name),
            value: self.value,
            overridden: self.overridden,
            expression_id: self.expression_id,
        }
    }
}

/// Compiled bytes of one matrix cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedProgram {
    pub tiers: TierPair,
    pub bytes: Vec<u8>,
}

/// Programs compiled for one target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedPlatform {
    pub platform: ShaderPlatform,
    pub programs: Vec<PackagedProgram>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedInstance {
    pub name: String,
    pub asset_id: Uuid,
    pub state_id: Uuid,
    #[serde(default)]
    pub kind: InstanceKind,
    /// Asset id of the parent.
    pub parent: Option<Uuid>,
    #[serde(default)]
    pub parameters: Vec<SerializedParameter>,
    #[serde(default)]
    pub static_parameters: Vec<SerializedParameter>,
    #[serde(default)]
    pub base_overrides: BasePropertyOverrides,
    #[serde(default)]
    pub packaged: Vec<PackagedPlatform>,
}

impl SerializedInstance {
    /// Captures an instance. Non-overridden static entries are dropped.
    #[must_use]
    pub fn capture(instance: &MaterialInstance, parent: Option<Uuid>) -> Self {
        Self {
            name: instance.name().to_string(),
            asset_id: instance.asset_id(),
            state_id: instance.state_id(),
            kind: instance.kind(),
            parent,
            parameters: instance
                .dynamic_overrides()
                .iter()
                .map(SerializedParameter::capture)
                .collect(),
            static_parameters: instance
                .static_overrides()
                .iter()
                .map(SerializedParameter::capture)
                .collect(),
            base_overrides: *instance.base_overrides(),
            packaged: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Runtime override table. Entries of static kinds are skipped.
    #[must_use]
    pub fn dynamic_table(&self) -> ParameterOverrideTable {
        let mut table = ParameterOverrideTable::new();
        for p in self.parameters.iter().filter(|p| !p.value.is_static()) {
            table.insert(p.to_entry());
        }
        table
    }

    /// Compile-time overrides. Non-overridden and non-static entries are skipped.
    #[must_use]
    pub fn static_set(&self) -> StaticParameterSet {
        let mut set = StaticParameterSet::new();
        for p in self.static_parameters.iter().filter(|p| p.overridden) {
            let entry = p.to_entry();
            set.set(entry.name, entry.value, entry.expression_id);
        }
        set
    }

    /// Programs packaged for `platform`.
    #[must_use]
    pub fn programs_for(&self, platform: ShaderPlatform) -> &[PackagedProgram] {
        self.packaged
            .iter()
            .find(|p| p.platform == platform)
            .map_or(&[][..], |p| &p.programs)
    }
}
