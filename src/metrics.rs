//! Prometheus metrics registry.
//!
//! Gauges cover index size, job state, and component health; histograms
//! cover search, answer, and embedding latency. Rendered in text
//! exposition format by `GET /metrics`.

use anyhow::Result;
use prometheus::{
    Gauge, Histogram, HistogramOpts, HistogramVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub indexed_documents: IntGaugeVec,
    pub job_running: IntGauge,
    pub progress_percent: Gauge,
    pub eta_seconds: Gauge,
    pub component_up: IntGaugeVec,
    pub search_seconds: HistogramVec,
    pub search_results: HistogramVec,
    pub answer_seconds: HistogramVec,
    pub embedding_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let indexed_documents = IntGaugeVec::new(
            Opts::new(
                "recall_indexed_documents",
                "Indexed document count per vault and index",
            ),
            &["vault", "index_type"],
        )?;
        let job_running = IntGauge::new("recall_index_job_running", "1 while an index job runs")?;
        let progress_percent = Gauge::new(
            "recall_index_progress_percent",
            "Progress of the running index job",
        )?;
        let eta_seconds = Gauge::new(
            "recall_index_eta_seconds",
            "Estimated seconds until the running index job completes",
        )?;
        let component_up = IntGaugeVec::new(
            Opts::new("recall_component_up", "Component health (1 = healthy)"),
            &["component"],
        )?;
        let search_seconds = HistogramVec::new(
            HistogramOpts::new("recall_search_seconds", "Search latency"),
            &["mode", "vault"],
        )?;
        let search_results = HistogramVec::new(
            HistogramOpts::new("recall_search_results", "Result count per search")
                .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0]),
            &["mode"],
        )?;
        let answer_seconds = HistogramVec::new(
            HistogramOpts::new("recall_answer_seconds", "RAG answer latency"),
            &["vault"],
        )?;
        let embedding_seconds = Histogram::with_opts(HistogramOpts::new(
            "recall_embedding_seconds",
            "Embedding request latency",
        ))?;

        registry.register(Box::new(indexed_documents.clone()))?;
        registry.register(Box::new(job_running.clone()))?;
        registry.register(Box::new(progress_percent.clone()))?;
        registry.register(Box::new(eta_seconds.clone()))?;
        registry.register(Box::new(component_up.clone()))?;
        registry.register(Box::new(search_seconds.clone()))?;
        registry.register(Box::new(search_results.clone()))?;
        registry.register(Box::new(answer_seconds.clone()))?;
        registry.register(Box::new(embedding_seconds.clone()))?;

        Ok(Self {
            registry,
            indexed_documents,
            job_running,
            progress_percent,
            eta_seconds,
            component_up,
            search_seconds,
            search_results,
            answer_seconds,
            embedding_seconds,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics
            .indexed_documents
            .with_label_values(&["work", "vector"])
            .set(12);
        metrics.job_running.set(1);
        metrics
            .search_seconds
            .with_label_values(&["hybrid", "all"])
            .observe(0.05);

        let text = metrics.render().unwrap();
        assert!(text.contains("recall_indexed_documents"));
        assert!(text.contains("recall_index_job_running 1"));
        assert!(text.contains("recall_search_seconds"));
    }
}
