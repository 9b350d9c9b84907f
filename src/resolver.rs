// 🔗 Institution Resolver - get-or-create by exact name
//
// The cache is owned by the caller and lives for one import run. Within a run
// a name never produces two institutions; two runs racing against the same
// store can still both create one (lookup → insert is not atomic).

use crate::entities::Institution;
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Store operations the resolver needs
pub trait InstitutionStore {
    fn find_institution_by_name(&self, name: &str) -> Result<Option<Institution>>;

    fn insert_institution(&mut self, institution: &Institution) -> Result<()>;

    /// Lookup by id. Stores that cannot answer return `Ok(None)`.
    fn find_institution_by_id(&self, _id: &str) -> Result<Option<Institution>> {
        Ok(None)
    }
}

/// Run-scoped name → institution id cache
#[derive(Debug, Clone, Default)]
pub struct InstitutionCache {
    ids: HashMap<String, String>,
}

impl InstitutionCache {
    pub fn new() -> Self {
        InstitutionCache::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.ids.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, id: &str) {
        self.ids.insert(name.to_string(), id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Resolve an institution name to its id, creating it on first sight.
///
/// 1. cache hit → no I/O
/// 2. exact-name match in the store → cached
/// 3. otherwise insert `{name, is_active: true}` → cached
pub fn resolve<S>(store: &mut S, name: &str, cache: &mut InstitutionCache) -> Result<String>
where
    S: InstitutionStore + ?Sized,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput(
            "institution name is empty".to_string(),
        ));
    }

    if let Some(id) = cache.get(name) {
        return Ok(id.to_string());
    }

    if let Some(existing) = store.find_institution_by_name(name)? {
        debug!(institution = name, id = %existing.id, "institution found in store");
        cache.insert(name, &existing.id);
        return Ok(existing.id);
    }

    let institution = Institution::new(name);
    store.insert_institution(&institution)?;
    info!(institution = name, id = %institution.id, "institution created");

    cache.insert(name, &institution.id);
    Ok(institution.id)
}
