//! Role-based capability checks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "config.write")]
    ConfigWrite,
    #[serde(rename = "run.execute")]
    RunExecute,
    #[serde(rename = "module.load")]
    ModuleLoad,
    #[serde(rename = "data.ingest")]
    DataIngest,
    #[serde(rename = "stream.manage")]
    StreamManage,
    #[serde(rename = "import.plugin")]
    ImportPlugin,
    #[serde(rename = "export.files")]
    ExportFiles,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::ConfigWrite,
        Capability::RunExecute,
        Capability::ModuleLoad,
        Capability::DataIngest,
        Capability::StreamManage,
        Capability::ImportPlugin,
        Capability::ExportFiles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ConfigWrite => "config.write",
            Capability::RunExecute => "run.execute",
            Capability::ModuleLoad => "module.load",
            Capability::DataIngest => "data.ingest",
            Capability::StreamManage => "stream.manage",
            Capability::ImportPlugin => "import.plugin",
            Capability::ExportFiles => "export.files",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub caps: BTreeSet<Capability>,
}

impl Role {
    pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self {
        Role {
            caps: caps.into_iter().collect(),
        }
    }
}

/// Role table: `{"roles": {"admin": {"caps": ["config.write", ...]}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rbac {
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
}

impl Rbac {
    /// admin holds every capability; ops everything but config.write and
    /// module.load; viewer may only export.
    pub fn standard() -> Self {
        let ops = Capability::ALL
            .into_iter()
            .filter(|c| !matches!(c, Capability::ConfigWrite | Capability::ModuleLoad));

        let mut roles = BTreeMap::new();
        roles.insert("admin".to_string(), Role::new(Capability::ALL));
        roles.insert("ops".to_string(), Role::new(ops));
        roles.insert("viewer".to_string(), Role::new([Capability::ExportFiles]));
        Rbac { roles }
    }

    pub fn allows(&self, role: &str, capability: Capability) -> bool {
        self.roles
            .get(role)
            .is_some_and(|r| r.caps.contains(&capability))
    }

    pub fn allows_any(&self, role: &str, capabilities: &[Capability]) -> bool {
        capabilities.iter().any(|c| self.allows(role, *c))
    }
}
