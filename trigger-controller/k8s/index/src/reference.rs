//! The reference index.
//!
//! The index records, for the last successful generation, which objects each
//! owner referred to. It is published as immutable [`Snapshot`]s: a commit
//! builds the next snapshot from the current one, sharing every per-kind map
//! it does not touch, and swaps it in with a single send on a watch channel.
//! Readers clone the current `Arc<Snapshot>` and never observe a partial
//! commit.

use ahash::AHashMap as HashMap;
use gateway_trigger_core::{GroupKind, Identity, ObjectKey};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::watch;

/// Applies a generation's reference delta to the index.
pub trait IndexCommitter: Send + 'static {
    fn commit(&mut self, delta: &Delta) -> Result<Arc<Snapshot>, IndexUnderflow>;
}

/// Publishes index snapshots. There is exactly one writer.
#[derive(Debug)]
pub struct Writer {
    tx: watch::Sender<Arc<Snapshot>>,
}

/// Reads the current index snapshot.
#[derive(Clone, Debug)]
pub struct Reader {
    rx: watch::Receiver<Arc<Snapshot>>,
}

/// Indicates that a delta removed a reference the index did not hold.
///
/// This can only happen if the generator's reported references are
/// inconsistent with the previous emission.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("index underflow: {owner} does not refer to {referent}")]
pub struct IndexUnderflow {
    pub owner: Identity,
    pub referent: Identity,
}

/// An immutable view of the index.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    generation: u64,
    kinds: HashMap<GroupKind, Arc<KindIndex>>,
    owners: HashMap<Identity, Arc<BTreeSet<Identity>>>,
}

/// The referenced objects of a single kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KindIndex {
    objects: HashMap<ObjectKey, Referent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Referent {
    /// The ports each owner referred to; `None` when the owner referred to the
    /// whole object.
    owners: BTreeMap<Identity, BTreeSet<Option<u16>>>,
    ports: BTreeMap<Option<u16>, usize>,
}

/// The referents each owner pulled into one emission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct References {
    owners: BTreeMap<Identity, BTreeSet<Identity>>,
}

/// Per-owner additions and removals between two emissions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
    owners: BTreeMap<Identity, OwnerDelta>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnerDelta {
    pub added: BTreeSet<Identity>,
    pub removed: BTreeSet<Identity>,
}

pub fn pair() -> (Writer, Reader) {
    let (tx, rx) = watch::channel(Arc::new(Snapshot::default()));
    (Writer { tx }, Reader { rx })
}

// === impl Writer ===

impl Writer {
    pub fn reader(&self) -> Reader {
        Reader {
            rx: self.tx.subscribe(),
        }
    }
}

impl IndexCommitter for Writer {
    fn commit(&mut self, delta: &Delta) -> Result<Arc<Snapshot>, IndexUnderflow> {
        let current = self.tx.borrow().clone();
        let next = Arc::new(current.apply(delta)?);
        tracing::debug!(
            generation = next.generation,
            owners = delta.owners.len(),
            "committed reference delta"
        );
        self.tx.send_replace(next.clone());
        Ok(next)
    }
}

// === impl Reader ===

impl Reader {
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.rx.borrow().clone()
    }

    /// Waits for the next commit.
    pub async fn changed(&mut self) -> Result<Arc<Snapshot>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

// === impl Snapshot ===

impl Snapshot {
    /// The number of commits that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_referred(&self, kind: &GroupKind, key: &ObjectKey) -> bool {
        self.kinds
            .get(kind)
            .is_some_and(|k| k.objects.contains_key(key))
    }

    /// Whether any owner referred to the object on the given port, or to the
    /// object as a whole.
    pub fn is_referred_by_port(&self, kind: &GroupKind, key: &ObjectKey, port: u16) -> bool {
        self.kinds
            .get(kind)
            .and_then(|k| k.objects.get(key))
            .is_some_and(|r| r.ports.contains_key(&Some(port)) || r.ports.contains_key(&None))
    }

    /// Whether the identity is present under its own kind. A port, if set,
    /// narrows the check to that port.
    pub fn contains(&self, id: &Identity) -> bool {
        let kind = id.group_kind();
        let key = id.key();
        match id.port {
            Some(port) => self.is_referred_by_port(&kind, &key, port),
            None => self.is_referred(&kind, &key),
        }
    }

    /// The number of distinct owners referring to the object.
    pub fn ref_count(&self, kind: &GroupKind, key: &ObjectKey) -> usize {
        self.kinds
            .get(kind)
            .and_then(|k| k.objects.get(key))
            .map_or(0, |r| r.owners.len())
    }

    /// Owners that refer to the object, on any port.
    pub fn referrers(&self, id: &Identity) -> Vec<&Identity> {
        self.kinds
            .get(&id.group_kind())
            .and_then(|k| k.objects.get(&id.key()))
            .map(|r| r.owners.keys().collect())
            .unwrap_or_default()
    }

    /// Everything the owner referred to in the last commit.
    pub fn referents_of(&self, owner: &Identity) -> Option<&BTreeSet<Identity>> {
        self.owners.get(owner).map(|r| &**r)
    }

    pub fn owners(&self) -> impl Iterator<Item = &Identity> {
        self.owners.keys()
    }

    /// The number of referenced objects of each kind.
    pub fn sizes(&self) -> impl Iterator<Item = (&GroupKind, usize)> {
        self.kinds.iter().map(|(k, idx)| (k, idx.objects.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Builds the next snapshot. The receiver is left unchanged, so a failed
    /// delta leaves the published index intact.
    pub fn apply(&self, delta: &Delta) -> Result<Self, IndexUnderflow> {
        let mut next = self.clone();
        next.generation += 1;

        for (owner, change) in &delta.owners {
            if change.removed.is_empty() && change.added.is_empty() {
                continue;
            }

            let mut referents = next
                .owners
                .get(owner)
                .map(|r| (**r).clone())
                .unwrap_or_default();

            for referent in &change.removed {
                if !referents.remove(referent) {
                    return Err(IndexUnderflow {
                        owner: owner.clone(),
                        referent: referent.clone(),
                    });
                }
                next.forget(owner, referent)?;
            }

            for referent in &change.added {
                if referents.insert(referent.clone()) {
                    next.record(owner, referent);
                }
            }

            if referents.is_empty() {
                next.owners.remove(owner);
            } else {
                next.owners.insert(owner.clone(), Arc::new(referents));
            }
        }

        Ok(next)
    }

    fn record(&mut self, owner: &Identity, referent: &Identity) {
        let kind = Arc::make_mut(self.kinds.entry(referent.group_kind()).or_default());
        let entry = kind.objects.entry(referent.key()).or_default();
        if entry
            .owners
            .entry(owner.clone())
            .or_default()
            .insert(referent.port)
        {
            *entry.ports.entry(referent.port).or_default() += 1;
        }
    }

    fn forget(&mut self, owner: &Identity, referent: &Identity) -> Result<(), IndexUnderflow> {
        let underflow = || IndexUnderflow {
            owner: owner.clone(),
            referent: referent.clone(),
        };

        let gk = referent.group_kind();
        let kind = Arc::make_mut(self.kinds.get_mut(&gk).ok_or_else(underflow)?);
        let key = referent.key();
        let entry = kind.objects.get_mut(&key).ok_or_else(underflow)?;

        let ports = entry.owners.get_mut(owner).ok_or_else(underflow)?;
        if !ports.remove(&referent.port) {
            return Err(underflow());
        }
        if ports.is_empty() {
            entry.owners.remove(owner);
        }

        match entry.ports.get_mut(&referent.port) {
            Some(n) if *n > 1 => *n -= 1,
            Some(_) => {
                entry.ports.remove(&referent.port);
            }
            None => return Err(underflow()),
        }

        if entry.owners.is_empty() {
            kind.objects.remove(&key);
        }
        if kind.objects.is_empty() {
            self.kinds.remove(&gk);
        }
        Ok(())
    }
}

/// Snapshots compare by content; the generation counter is ignored.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.kinds == other.kinds && self.owners == other.owners
    }
}

// === impl References ===

impl References {
    /// Records an owner. Every owner refers to itself so that it is present
    /// in the index under its own kind.
    pub fn owner(&mut self, owner: &Identity) {
        let owner = owner.without_port();
        self.owners
            .entry(owner.clone())
            .or_default()
            .insert(owner);
    }

    pub fn refer(&mut self, owner: &Identity, referent: Identity) {
        let owner = owner.without_port();
        let referents = self.owners.entry(owner.clone()).or_default();
        referents.insert(owner);
        referents.insert(referent);
    }

    pub fn contains_owner(&self, owner: &Identity) -> bool {
        self.owners.contains_key(owner)
    }

    pub fn referents_of(&self, owner: &Identity) -> Option<&BTreeSet<Identity>> {
        self.owners.get(owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &BTreeSet<Identity>)> {
        self.owners.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

// === impl Delta ===

impl Delta {
    /// Computes the per-owner symmetric difference between two emissions.
    pub fn between(prev: &References, next: &References) -> Self {
        let empty = BTreeSet::new();
        let mut owners = BTreeMap::new();

        let all = prev.owners.keys().chain(next.owners.keys());
        for owner in all.collect::<BTreeSet<_>>() {
            let before = prev.owners.get(owner).unwrap_or(&empty);
            let after = next.owners.get(owner).unwrap_or(&empty);
            let change = OwnerDelta {
                added: after.difference(before).cloned().collect(),
                removed: before.difference(after).cloned().collect(),
            };
            if !change.added.is_empty() || !change.removed.is_empty() {
                owners.insert(owner.clone(), change);
            }
        }

        Self { owners }
    }

    pub fn add(&mut self, owner: &Identity, referent: Identity) {
        let change = self.owners.entry(owner.clone()).or_default();
        change.removed.remove(&referent);
        change.added.insert(referent);
    }

    pub fn remove(&mut self, owner: &Identity, referent: Identity) {
        let change = self.owners.entry(owner.clone()).or_default();
        change.added.remove(&referent);
        change.removed.insert(referent);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &OwnerDelta)> {
        self.owners.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
