//! Explicit references to externally-owned sets.

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::clients::{ClientResult, RequestContext, SetClient, SetWithMaterials};
use crate::shared_kernel::SetId;

/// A lazily-resolved, cached reference to a set owned by the external set
/// service.
///
/// The reference is the identifier; `resolve` fetches the remote state at
/// most once per instance and caches it. Cloning carries the identifier
/// and whatever was already resolved.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetRef {
    pub id: SetId,
    #[serde(skip)]
    cache: OnceCell<SetWithMaterials>,
}

impl SetRef {
    pub fn new(id: SetId) -> Self {
        Self {
            id,
            cache: OnceCell::new(),
        }
    }

    /// Resolve the referenced set, fetching it on first use.
    pub async fn resolve(
        &self,
        client: &dyn SetClient,
        ctx: &RequestContext,
    ) -> ClientResult<&SetWithMaterials> {
        self.cache
            .get_or_try_init(|| async { client.find_with_materials(&self.id, ctx).await })
            .await
    }

    /// The cached resolution, if any.
    pub fn cached(&self) -> Option<&SetWithMaterials> {
        self.cache.get()
    }
}

impl Clone for SetRef {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cache: OnceCell::new_with(self.cache.get().cloned()),
        }
    }
}

impl PartialEq for SetRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl From<SetId> for SetRef {
    fn from(id: SetId) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MaterialSet;
    use crate::testing::InMemorySetClient;

    #[tokio::test]
    async fn resolve_fetches_once_and_caches() {
        let client = InMemorySetClient::new();
        let ctx = RequestContext::system();
        let set = client.seed_set("input", false, None);

        let set_ref = SetRef::new(set.id);
        assert!(set_ref.cached().is_none());

        let resolved = set_ref.resolve(&client, &ctx).await.unwrap();
        assert_eq!(resolved.set.name, "input");
        assert_eq!(client.find_calls(), 1);

        // Second resolve serves the cache.
        set_ref.resolve(&client, &ctx).await.unwrap();
        assert_eq!(client.find_calls(), 1);
        assert!(set_ref.cached().is_some());
    }

    #[tokio::test]
    async fn clone_keeps_id_and_resolved_state() {
        let client = InMemorySetClient::new();
        let ctx = RequestContext::system();
        let set: MaterialSet = client.seed_set("input", false, None);

        let set_ref = SetRef::new(set.id);
        set_ref.resolve(&client, &ctx).await.unwrap();

        let cloned = set_ref.clone();
        assert_eq!(cloned.id, set.id);
        assert!(cloned.cached().is_some());
    }
}
