use crate::{dispatch::Event, Reader};
use gateway_trigger_core::{Error, GroupKind};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct DispatchMetrics {
    verdicts: Family<VerdictLabels, Counter>,
    errors: Family<ErrorLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct VerdictLabels {
    kind: String,
    event: &'static str,
    verdict: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ErrorLabels {
    kind: String,
    error: &'static str,
}

#[derive(Debug)]
struct IndexSize(Reader);

// === impl DispatchMetrics ===

impl DispatchMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let verdicts = Family::default();
        prom.register(
            "dispatch_verdicts",
            "Count of dispatch verdicts by kind, event and outcome",
            verdicts.clone(),
        );

        let errors = Family::default();
        prom.register(
            "dispatch_errors",
            "Count of objects that could not be classified",
            errors.clone(),
        );

        Self { verdicts, errors }
    }

    pub(crate) fn verdict(&self, kind: &GroupKind, event: Event, effective: bool) {
        self.verdicts
            .get_or_create(&VerdictLabels {
                kind: kind.to_string(),
                event: event.as_str(),
                verdict: if effective { "effective" } else { "ineffective" },
            })
            .inc();
    }

    pub(crate) fn error(&self, kind: &GroupKind, error: &Error) {
        self.errors
            .get_or_create(&ErrorLabels {
                kind: kind.to_string(),
                error: error.label(),
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn verdicts(&self, kind: &GroupKind, event: Event, effective: bool) -> u64 {
        self.verdicts
            .get_or_create(&VerdictLabels {
                kind: kind.to_string(),
                event: event.as_str(),
                verdict: if effective { "effective" } else { "ineffective" },
            })
            .get()
    }

    #[cfg(test)]
    pub(crate) fn errors(&self, kind: &GroupKind, error: &'static str) -> u64 {
        self.errors
            .get_or_create(&ErrorLabels {
                kind: kind.to_string(),
                error,
            })
            .get()
    }
}

// === impl IndexSize ===

/// Reports the number of referenced objects per kind in the current snapshot.
pub fn register_index_size(prom: &mut Registry, index: Reader) {
    prom.register_collector(Box::new(IndexSize(index)));
}

impl Collector for IndexSize {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let snapshot = self.0.snapshot();

        let mut size_encoder = encoder.encode_descriptor(
            "reference_index_size",
            "The number of referenced objects in the index",
            None,
            MetricType::Gauge,
        )?;
        let mut sizes = snapshot
            .sizes()
            .map(|(kind, n)| (kind.to_string(), n))
            .collect::<Vec<_>>();
        sizes.sort();
        for (kind, n) in sizes {
            let labels = vec![("kind", kind.as_str())];
            let size = ConstGauge::new(n as u32);
            size.encode(size_encoder.encode_family(&labels)?)?;
        }

        Ok(())
    }
}
