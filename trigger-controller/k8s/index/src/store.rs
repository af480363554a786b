use ahash::AHashMap as HashMap;
use gateway_trigger_core::{Classified, GroupKind, Identity, ObjectKey};
use parking_lot::RwLock;
use std::sync::Arc;

/// The last observed projection of every watched object.
///
/// Written by the watch tasks as events arrive; read by the oracle and by
/// the generator.
#[derive(Clone, Debug, Default)]
pub struct Store(Arc<RwLock<Objects>>);

/// A point-in-time copy of the store's contents.
#[derive(Clone, Debug, Default)]
pub struct Objects {
    by_kind: HashMap<GroupKind, HashMap<ObjectKey, Arc<Classified>>>,
}

// === impl Store ===

impl Store {
    /// Records an object, returning the previously observed version of it.
    pub fn apply(&self, obj: Classified) -> Option<Arc<Classified>> {
        let kind = obj.id.group_kind();
        let key = obj.id.key();
        self.0
            .write()
            .by_kind
            .entry(kind)
            .or_default()
            .insert(key, Arc::new(obj))
    }

    pub fn remove(&self, kind: &GroupKind, key: &ObjectKey) -> Option<Arc<Classified>> {
        let mut objects = self.0.write();
        let by_key = objects.by_kind.get_mut(kind)?;
        let removed = by_key.remove(key);
        if by_key.is_empty() {
            objects.by_kind.remove(kind);
        }
        removed
    }

    pub fn get(&self, kind: &GroupKind, key: &ObjectKey) -> Option<Arc<Classified>> {
        self.0.read().get(kind, key)
    }

    pub fn get_id(&self, id: &Identity) -> Option<Arc<Classified>> {
        self.get(&id.group_kind(), &id.key())
    }

    pub fn len(&self, kind: &GroupKind) -> usize {
        self.0.read().by_kind.get(kind).map_or(0, |o| o.len())
    }

    pub fn snapshot(&self) -> Objects {
        self.0.read().clone()
    }
}

// === impl Objects ===

impl Objects {
    pub fn get(&self, kind: &GroupKind, key: &ObjectKey) -> Option<Arc<Classified>> {
        self.by_kind.get(kind)?.get(key).cloned()
    }

    pub fn get_id(&self, id: &Identity) -> Option<&Classified> {
        self.by_kind
            .get(&id.group_kind())?
            .get(&id.key())
            .map(|o| &**o)
    }

    /// All objects of a kind, ordered by namespace and name.
    pub fn list(&self, kind: &GroupKind) -> Vec<&Classified> {
        let mut objects = self
            .by_kind
            .get(kind)
            .into_iter()
            .flat_map(|o| o.values())
            .map(|o| &**o)
            .collect::<Vec<_>>();
        objects.sort_by(|a, b| a.id.cmp(&b.id));
        objects
    }

    pub fn list_namespace(&self, kind: &GroupKind, namespace: &str) -> Vec<&Classified> {
        let mut objects = self.list(kind);
        objects.retain(|o| o.id.namespace == namespace);
        objects
    }
}
