use prometheus::{
    opts, register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounterVec, IntGauge, IntGaugeVec, Registry,
};

const METRICS_NAMESPACE: &str = "relayer";

fn namespaced(name: &str) -> String {
    format!("{}_{}", METRICS_NAMESPACE, name)
}

/// Prometheus metrics of the relayer
#[derive(Clone)]
pub struct RelayerMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,
    /// with labels for the submission kind and the outcome, e.g. "confirmed", "requeued"
    submissions: IntCounterVec,
    queue_length: IntGauge,
    signer_pool_size: IntGauge,
    signer_nonce: IntGaugeVec,
    /// with a label for how the pass ended
    processing_passes: IntCounterVec,
}

impl RelayerMetrics {
    pub fn new(registry: Registry) -> eyre::Result<Self> {
        let submissions = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("submissions"),
                "The number of submission attempts, by kind and outcome",
            ),
            &["kind", "outcome",],
            registry.clone()
        )?;
        let queue_length = register_int_gauge_with_registry!(
            opts!(
                namespaced("queue_length"),
                "The number of requests waiting in the submission queue",
            ),
            registry.clone()
        )?;
        let signer_pool_size = register_int_gauge_with_registry!(
            opts!(
                namespaced("signer_pool_size"),
                "The number of funded signers in the pool",
            ),
            registry.clone()
        )?;
        let signer_nonce = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced("signer_nonce"),
                "The nonce the relayer tracks for each signer",
            ),
            &["address",],
            registry.clone()
        )?;
        let processing_passes = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("processing_passes"),
                "The number of queue processing passes, by how they ended",
            ),
            &["outcome",],
            registry.clone()
        )?;

        Ok(Self {
            registry,
            submissions,
            queue_length,
            signer_pool_size,
            signer_nonce,
            processing_passes,
        })
    }

    pub fn update_submissions_metric(&self, kind: &str, outcome: &str) {
        self.submissions.with_label_values(&[kind, outcome]).inc();
    }

    pub fn update_queue_length_metric(&self, length: usize) {
        self.queue_length.set(length as i64);
    }

    pub fn update_signer_pool_size_metric(&self, size: usize) {
        self.signer_pool_size.set(size as i64);
    }

    pub fn update_signer_nonce_metric(&self, address: &str, nonce: u64) {
        self.signer_nonce
            .with_label_values(&[address])
            .set(nonce as i64);
    }

    pub fn update_processing_passes_metric(&self, outcome: &str) {
        self.processing_passes.with_label_values(&[outcome]).inc();
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics format)
    /// report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    #[cfg(test)]
    pub fn dummy_instance() -> Self {
        let registry = Registry::new();
        let instance = Self::new(registry.clone());
        instance.unwrap()
    }
}
