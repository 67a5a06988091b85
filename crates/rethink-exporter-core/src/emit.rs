//! Per-cycle sample buffer and Prometheus family assembly.

use std::sync::{Arc, Mutex, PoisonError};

use prometheus::proto;

use crate::desc::{DescriptorSet, FamilyDesc};

/// One gauge sample: a family, its label values in declaration order, and
/// the observed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub family: &'static str,
    pub labels: Vec<String>,
    pub value: f64,
}

/// Shared emission path for one scrape cycle.
///
/// The streaming loop and every enrichment task push into the same buffer;
/// a mutex keeps concurrent writers safe. Nothing is retained across
/// cycles.
#[derive(Clone, Default)]
pub struct SampleSink {
    samples: Arc<Mutex<Vec<Sample>>>,
}

impl SampleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample for `family`.
    pub fn emit(&self, family: &FamilyDesc, value: f64, labels: &[&str]) {
        debug_assert_eq!(family.labels.len(), labels.len());
        let sample = Sample {
            family: family.name,
            labels: labels.iter().map(|label| label.to_string()).collect(),
            value,
        };
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }

    /// Take every sample emitted so far, in emission order.
    pub fn drain(&self) -> Vec<Sample> {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *samples)
    }
}

/// Assemble drained samples into gauge families, in catalog order.
///
/// Families with no samples this cycle are omitted. Within a family the
/// samples are sorted by label values, so identical input data yields an
/// identical snapshot regardless of enrichment completion order. Samples
/// for families outside the catalog are dropped.
pub fn assemble(descs: &DescriptorSet, samples: Vec<Sample>) -> Vec<proto::MetricFamily> {
    let mut remaining = samples;
    let mut families = Vec::new();

    for family in descs.families() {
        let (mut group, rest): (Vec<Sample>, Vec<Sample>) = remaining
            .into_iter()
            .partition(|sample| sample.family == family.name);
        remaining = rest;
        if group.is_empty() {
            continue;
        }
        group.sort_by(|a, b| a.labels.cmp(&b.labels));
        families.push(build_family(family, group));
    }

    families
}

fn build_family(family: &FamilyDesc, samples: Vec<Sample>) -> proto::MetricFamily {
    let mut proto_family = proto::MetricFamily::default();
    proto_family.set_name(family.name.to_string());
    proto_family.set_help(family.help.to_string());
    proto_family.set_field_type(proto::MetricType::GAUGE);

    for sample in samples {
        let mut metric = proto::Metric::default();
        for (name, value) in family.labels.iter().zip(sample.labels) {
            let mut pair = proto::LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(value);
            metric.mut_label().push(pair);
        }
        let mut gauge = proto::Gauge::default();
        gauge.set_value(sample.value);
        metric.set_gauge(gauge);
        proto_family.mut_metric().push(metric);
    }

    proto_family
}
