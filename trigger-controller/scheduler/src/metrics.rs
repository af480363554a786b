use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        counter::Counter,
        family::Family,
        gauge::Gauge,
        histogram::{exponential_buckets, Histogram},
    },
    registry::{Registry, Unit},
};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SchedulerMetrics {
    debounce_wait: Histogram,
    generate_duration: Histogram,
    generations: Family<ResultLabels, Counter>,
    consecutive_failures: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResultLabels {
    result: &'static str,
}

impl SchedulerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let debounce_wait = Histogram::new(exponential_buckets(0.005, 2.0, 12));
        prom.register_with_unit(
            "debounce_wait",
            "Time from the first effective event to the launch of a generation",
            Unit::Seconds,
            debounce_wait.clone(),
        );

        let generate_duration = Histogram::new(exponential_buckets(0.001, 2.0, 16));
        prom.register_with_unit(
            "generate_duration",
            "Time taken by the generator, including failed and timed out runs",
            Unit::Seconds,
            generate_duration.clone(),
        );

        let generations = Family::default();
        prom.register(
            "generations",
            "Count of completed generations by result",
            generations.clone(),
        );

        let consecutive_failures = Gauge::default();
        prom.register(
            "consecutive_failures",
            "The number of generations that have failed since the last success",
            consecutive_failures.clone(),
        );

        Self {
            debounce_wait,
            generate_duration,
            generations,
            consecutive_failures,
        }
    }

    pub(crate) fn launched(&self, waited: Duration) {
        self.debounce_wait.observe(waited.as_secs_f64());
    }

    pub(crate) fn completed(&self, result: &'static str, elapsed: Duration, failures: u32) {
        self.generate_duration.observe(elapsed.as_secs_f64());
        self.generations
            .get_or_create(&ResultLabels { result })
            .inc();
        self.consecutive_failures.set(failures.into());
    }

    #[cfg(test)]
    pub(crate) fn generations(&self, result: &'static str) -> u64 {
        self.generations.get_or_create(&ResultLabels { result }).get()
    }
}
