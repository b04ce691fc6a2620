//! Default Material Context
//!
//! Each domain has a fallback material that renders whenever a material's
//! own program is missing, still compiling, or failed. The context is
//! initialized once before first use and torn down explicitly.

use crate::errors::{MaterialError, Result};
use crate::material::definition::{DOMAIN_COUNT, MaterialDomain};
use crate::material::registry::MaterialHandle;

#[derive(Debug, Default)]
pub struct DefaultMaterials {
    materials: Option<[Option<MaterialHandle>; DOMAIN_COUNT]>,
}

impl DefaultMaterials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the fallback of each listed domain.
    ///
    /// A surface default is required; other domains without an entry fall
    /// back to it.
    pub fn initialize(
        &mut self,
        defaults: impl IntoIterator<Item = (MaterialDomain, MaterialHandle)>,
    ) -> Result<()> {
        if self.materials.is_some() {
            return Err(MaterialError::DefaultsAlreadyInitialized);
        }
        let mut table = [None; DOMAIN_COUNT];
        for (domain, handle) in defaults {
            table[domain.index()] = Some(handle);
        }
        if table[MaterialDomain::Surface.index()].is_none() {
            return Err(MaterialError::InvalidHandle(
                "no default surface material".to_string(),
            ));
        }
        self.materials = Some(table);
        Ok(())
    }

    /// Clears the context. Returns the handles that were registered.
    pub fn teardown(&mut self) -> Vec<MaterialHandle> {
        self.materials
            .take()
            .map(|table| table.into_iter().flatten().collect())
            .unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.materials.is_some()
    }

    /// Fallback material for `domain`.
    pub fn get(&self, domain: MaterialDomain) -> Result<MaterialHandle> {
        let table = self
            .materials
            .as_ref()
            .ok_or(MaterialError::DefaultsNotInitialized)?;
        table[domain.index()]
            .or(table[MaterialDomain::Surface.index()])
            .ok_or(MaterialError::DefaultsNotInitialized)
    }

    /// Domain `handle` is the registered default of, if any.
    #[must_use]
    pub fn domain_of(&self, handle: MaterialHandle) -> Option<MaterialDomain> {
        let table = self.materials.as_ref()?;
        MaterialDomain::ALL
            .into_iter()
            .find(|d| table[d.index()] == Some(handle))
    }

    /// Snapshot of the table with surface substituted for missing domains.
    pub fn table(&self) -> Result<[Option<MaterialHandle>; DOMAIN_COUNT]> {
        let mut out = [None; DOMAIN_COUNT];
        for domain in MaterialDomain::ALL {
            out[domain.index()] = Some(self.get(domain)?);
        }
        Ok(out)
    }
}
