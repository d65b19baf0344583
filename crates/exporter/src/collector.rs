use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::core::Desc;
use prometheus::proto;
use prometheus::Gauge;

use crate::sample::unix_now_ns;
use crate::sample::Sample;
use crate::store::SampleStore;

const SAMPLE_HELP: &str = "InfluxDB Metric";

/// Pull-side view of the sample store.
///
/// `desc` announces only the static last-push gauge; the sample set is
/// dynamic and intentionally undescribed. `collect` yields the gauge first,
/// then one untyped metric per non-expired sample from a store snapshot.
pub struct InfluxCollector {
    store: Arc<SampleStore>,
    last_push: Gauge,
    sample_expiry: Duration,
    export_timestamp: bool,
}

impl InfluxCollector {
    pub fn new(
        store: Arc<SampleStore>,
        last_push: Gauge,
        sample_expiry: Duration,
        export_timestamp: bool,
    ) -> Self {
        Self {
            store,
            last_push,
            sample_expiry,
            export_timestamp,
        }
    }

    /// One UNTYPED metric for a sample, labels in name order.
    fn to_metric(&self, sample: &Sample) -> proto::Metric {
        let mut labels: Vec<(&String, &String)> = sample.labels.iter().collect();
        labels.sort_by_key(|(name, _)| *name);

        let mut metric = proto::Metric::default();
        for (name, value) in labels {
            let mut pair = proto::LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            metric.mut_label().push(pair);
        }

        let mut untyped = proto::Untyped::default();
        untyped.set_value(sample.value);
        metric.set_untyped(untyped);

        if self.export_timestamp {
            metric.set_timestamp_ms(sample.timestamp_ns / 1_000_000);
        }
        metric
    }
}

impl Collector for InfluxCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.last_push.desc()
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let mut families = self.last_push.collect();

        // Snapshot under the store lock, filter after releasing it. Samples
        // past the expiry window are skipped even if the reaper has not run.
        let age_limit_ns = unix_now_ns() - self.sample_expiry.as_nanos() as i64;
        let mut by_name: BTreeMap<String, proto::MetricFamily> = BTreeMap::new();
        for sample in self.store.snapshot() {
            if sample.timestamp_ns < age_limit_ns {
                continue;
            }
            let family = by_name.entry(sample.name.clone()).or_insert_with(|| {
                let mut family = proto::MetricFamily::default();
                family.set_name(sample.name.clone());
                family.set_help(SAMPLE_HELP.to_string());
                family.set_field_type(proto::MetricType::UNTYPED);
                family
            });
            family.mut_metric().push(self.to_metric(&sample));
        }

        families.extend(by_name.into_values());
        families
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use prometheus::Encoder;
    use prometheus::Registry;
    use prometheus::TextEncoder;

    use super::*;
    use crate::sample::Sample;

    const EXPIRY: Duration = Duration::from_secs(300);

    fn collector(store: Arc<SampleStore>, export_timestamp: bool) -> InfluxCollector {
        let last_push = Gauge::new(
            "influxdb_last_push_timestamp_seconds",
            "Unix timestamp of the last received influxdb metrics push in seconds.",
        )
        .expect("gauge");
        InfluxCollector::new(store, last_push, EXPIRY, export_timestamp)
    }

    fn labeled_sample(name: &str, labels: &[(&str, &str)], value: f64, timestamp_ns: i64) -> Sample {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Sample::new(name.to_string(), labels, value, timestamp_ns)
    }

    #[test]
    fn collect_yields_last_push_gauge_first() {
        let store = Arc::new(SampleStore::new());
        store.upsert(labeled_sample("cpu", &[], 1.0, unix_now_ns()));

        let families = collector(store, false).collect();
        assert_eq!(families[0].get_name(), "influxdb_last_push_timestamp_seconds");
        assert_eq!(families.len(), 2);
    }

    #[test]
    fn collect_skips_expired_samples_without_reaper() {
        let store = Arc::new(SampleStore::new());
        let now = unix_now_ns();
        store.upsert(labeled_sample("fresh", &[], 1.0, now));
        store.upsert(labeled_sample("stale", &[], 1.0, now - EXPIRY.as_nanos() as i64 * 2));

        let families = collector(store.clone(), false).collect();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"fresh"));
        assert!(!names.contains(&"stale"));
        // Collection filters; it does not delete.
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn samples_sharing_a_name_merge_into_one_family() {
        let store = Arc::new(SampleStore::new());
        let now = unix_now_ns();
        store.upsert(labeled_sample("cpu", &[("host", "a")], 1.0, now));
        store.upsert(labeled_sample("cpu", &[("host", "b")], 2.0, now));

        let families = collector(store, false).collect();
        let cpu = families.iter().find(|f| f.get_name() == "cpu").expect("cpu family");
        assert_eq!(cpu.get_metric().len(), 2);
        assert_eq!(cpu.get_field_type(), proto::MetricType::UNTYPED);
        assert_eq!(cpu.get_help(), SAMPLE_HELP);
    }

    #[test]
    fn labels_are_sorted_by_name() {
        let store = Arc::new(SampleStore::new());
        store.upsert(labeled_sample(
            "cpu",
            &[("zone", "z1"), ("host", "a"), ("region", "eu")],
            1.0,
            unix_now_ns(),
        ));

        let families = collector(store, false).collect();
        let cpu = families.iter().find(|f| f.get_name() == "cpu").expect("cpu family");
        let names: Vec<&str> = cpu.get_metric()[0].get_label().iter().map(|l| l.get_name()).collect();
        assert_eq!(names, ["host", "region", "zone"]);
    }

    #[test]
    fn timestamps_exported_only_when_enabled() {
        let ts = unix_now_ns();
        let store = Arc::new(SampleStore::new());
        store.upsert(labeled_sample("cpu", &[], 1.0, ts));

        let families = collector(store.clone(), false).collect();
        let cpu = families.iter().find(|f| f.get_name() == "cpu").expect("cpu family");
        assert_eq!(cpu.get_metric()[0].get_timestamp_ms(), 0);

        let families = collector(store, true).collect();
        let cpu = families.iter().find(|f| f.get_name() == "cpu").expect("cpu family");
        assert_eq!(cpu.get_metric()[0].get_timestamp_ms(), ts / 1_000_000);
    }

    #[test]
    fn renders_through_a_registry_and_text_encoder() {
        let store = Arc::new(SampleStore::new());
        store.upsert(labeled_sample("cpu", &[("host", "a")], 42.0, unix_now_ns()));
        let collector = collector(store, false);
        collector.last_push.set(1.5);

        let registry = Registry::new();
        registry.register(Box::new(collector)).expect("register");

        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .expect("encode");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.contains("influxdb_last_push_timestamp_seconds 1.5"));
        assert!(text.contains("cpu{host=\"a\"} 42"));
        assert!(text.contains("# TYPE cpu untyped"));
    }
}
