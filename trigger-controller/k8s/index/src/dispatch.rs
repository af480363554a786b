//! Trigger dispatch.
//!
//! Every watched kind is dispatched through the same function: the object is
//! classified, recorded in the [`Store`], and judged by the rule its registry
//! entry names. A `true` verdict marks the scheduler dirty. Dispatch never
//! writes the reference index and never runs the generator.

use crate::{
    metrics::DispatchMetrics,
    oracle::{EffectivenessOracle, Oracle},
    store::Store,
};
use gateway_trigger_core::{Classified, Error, GroupKind, Identity, ObjectKey, Trigger};
use gateway_trigger_k8s_api::Classify;
use kube::Resource;

/// Notifies the scheduler that the emitted configuration may be stale.
pub trait DirtySignal: Clone + Send + Sync + 'static {
    fn mark_dirty(&self);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Insert,
    Delete,
}

/// Feeds watch events through the dispatch table.
///
/// Implements the `kubert::index` traits for every classifiable resource so
/// that it can be driven directly by watch streams.
#[derive(Clone, Debug)]
pub struct Dispatch<S> {
    oracle: Oracle,
    metrics: DispatchMetrics,
    signal: S,
}

// === impl Event ===

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether an event on `obj` may affect the emitted configuration.
pub fn verdict<O: EffectivenessOracle>(oracle: &O, event: Event, obj: &Classified) -> bool {
    // Anything the last generation referred to is effective, whatever its
    // kind's rule says.
    if oracle.is_referred(&obj.id) {
        return true;
    }

    let ns = obj.id.namespace.as_str();
    match obj.info.trigger {
        Trigger::Always => true,

        Trigger::AcceptedGateway => match event {
            Event::Insert => oracle.is_accepted_gateway(obj),
            Event::Delete => oracle.on_delete_gateway(&obj.id),
        },

        Trigger::EffectiveRoute => obj
            .route()
            .is_some_and(|r| oracle.is_effective_route(ns, &r.parent_refs)),

        Trigger::EffectiveTargetRefs => obj.policy().is_some_and(|p| {
            p.target_refs
                .iter()
                .any(|t| oracle.is_effective_target_ref(obj, t))
        }),

        Trigger::RoutableTargetServices => obj.policy().is_some_and(|p| {
            p.target_refs
                .iter()
                .any(|t| oracle.is_routable_target_service(obj, t))
        }),

        Trigger::RoutableLocalTargetServices => obj
            .policy()
            .is_some_and(|p| oracle.is_routable_local_target_services(obj, &p.target_refs)),

        Trigger::ValidLocalTargetRoutes => obj
            .policy()
            .is_some_and(|p| oracle.is_valid_local_target_routes(obj, &p.target_refs)),

        Trigger::Filter => oracle.is_filter_referred(&obj.id),

        Trigger::ListenerFilter => {
            oracle.is_listener_filter_referred(&obj.id)
                || obj.filter().is_some_and(|f| {
                    f.target_refs
                        .iter()
                        .filter(|t| obj.info.may_target(&t.group, &t.kind))
                        .any(|t| oracle.is_referred(&t.resolve(ns).without_port()))
                })
        }

        Trigger::FilterDefinition => oracle.is_filter_definition_referred(&obj.id),

        Trigger::FilterConfig => oracle.is_filter_config_referred(&obj.id),

        Trigger::RoutableService => oracle.is_routable_service(&obj.id.key()),

        Trigger::Endpoints => {
            let svc = obj.id.key();
            if oracle.uses_endpoint_slices() {
                oracle.is_headless_service(&svc) && oracle.is_routable_service(&svc)
            } else {
                oracle.is_routable_service(&svc)
            }
        }

        Trigger::EndpointSlice => {
            let Some(slice) = obj.endpoint_slice() else {
                return false;
            };
            let service = match event {
                Event::Insert => slice.service_label.as_deref(),
                Event::Delete => slice
                    .owner_service
                    .as_deref()
                    .or(slice.service_label.as_deref()),
            };
            service.is_some_and(|name| oracle.is_routable_service(&ObjectKey::new(ns, name)))
        }

        Trigger::Secret => oracle.is_secret_referred(&obj.id),

        Trigger::ConfigMap => oracle.is_config_map_referred(&obj.id),
    }
}

// === impl Dispatch ===

impl<S: DirtySignal> Dispatch<S> {
    pub fn new(oracle: Oracle, metrics: DispatchMetrics, signal: S) -> Self {
        Self {
            oracle,
            metrics,
            signal,
        }
    }

    pub fn store(&self) -> &Store {
        self.oracle.store()
    }

    /// Observes an added or updated object. An update is judged as the
    /// deletion of the previous object followed by the insertion of the new
    /// one; either verdict marks the scheduler dirty.
    pub fn insert<R>(&self, resource: R) -> bool
    where
        R: Classify + Resource<DynamicType = ()>,
    {
        let gk = GroupKind::new(R::group(&()), R::kind(&()));
        let obj = match resource.classify() {
            Ok(obj) => obj,
            Err(error) => {
                self.invalid(&gk, error);
                return false;
            }
        };

        // Objects resent with an unchanged version are resyncs.
        let id = obj.id.clone();
        if let Some(prev) = self.store().get_id(&id) {
            if prev.version.is_some() && prev.version == obj.version {
                tracing::trace!(%id, "unchanged");
                return false;
            }
        }

        let prev = self.store().apply(obj);
        let view = self.oracle.view();
        let mut effective = false;
        if let Some(prev) = prev {
            effective |= self.judge(&view, Event::Delete, &prev);
        }
        if let Some(obj) = self.store().get_id(&id) {
            effective |= self.judge(&view, Event::Insert, &obj);
        }
        self.notify(effective);
        effective
    }

    /// Observes the removal of an object. The last observed version is
    /// recovered from the store; an object that was never observed is
    /// effective only if the index refers to it.
    pub fn remove(&self, kind: GroupKind, key: ObjectKey) -> bool {
        let Some(prev) = self.store().remove(&kind, &key) else {
            let id = Identity::new(kind.group, kind.kind, key.namespace, key.name);
            let effective = self.oracle.view().is_referred(&id);
            tracing::debug!(%id, effective, "deleted object was never observed");
            self.notify(effective);
            return effective;
        };
        let view = self.oracle.view();
        let effective = self.judge(&view, Event::Delete, &prev);
        self.notify(effective);
        effective
    }

    fn judge<O: EffectivenessOracle>(&self, oracle: &O, event: Event, obj: &Classified) -> bool {
        let effective = verdict(oracle, event, obj);
        tracing::debug!(id = %obj.id, %event, effective);
        self.metrics.verdict(&obj.info.group_kind(), event, effective);
        effective
    }

    fn invalid(&self, kind: &GroupKind, error: Error) {
        self.metrics.error(kind, &error);
        match error {
            Error::UnknownKind(_) => tracing::warn!(%error, "ignoring object"),
            Error::MalformedObject { .. } => tracing::error!(%error, "ignoring object"),
        }
    }

    fn notify(&self, effective: bool) {
        if effective {
            self.signal.mark_dirty();
        }
    }
}

impl<R, S> kubert::index::IndexNamespacedResource<R> for Dispatch<S>
where
    R: Classify + Resource<DynamicType = ()>,
    S: DirtySignal,
{
    fn apply(&mut self, resource: R) {
        self.insert(resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let kind = GroupKind::new(R::group(&()), R::kind(&()));
        self.remove(kind, ObjectKey::new(namespace, name));
    }
}

impl<R, S> kubert::index::IndexClusterResource<R> for Dispatch<S>
where
    R: Classify + Resource<DynamicType = ()>,
    S: DirtySignal,
{
    fn apply(&mut self, resource: R) {
        self.insert(resource);
    }

    fn delete(&mut self, name: String) {
        let kind = GroupKind::new(R::group(&()), R::kind(&()));
        self.remove(kind, ObjectKey::new("", name));
    }
}

#[cfg(test)]
mod tests;
