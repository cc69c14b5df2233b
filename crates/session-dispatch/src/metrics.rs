use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::result::ResultCode;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static DISPATCH_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "session_dispatch_results_total",
            "results delivered to controllers by code",
        ),
        &["code"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ADMISSION_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "session_admission_decisions_total",
            "controller admission decisions by outcome",
        ),
        &["result"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static DROPPED_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "session_dropped_calls_total",
            "inbound calls dropped without a result by reason",
        ),
        &["reason"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static QUEUE_FLUSHED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "session_queue_flushed_total",
        "queued commands dropped by a flush",
    ))
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub(crate) fn record_result(code: ResultCode) {
    DISPATCH_RESULTS.with_label_values(&[code.as_str()]).inc();
}

pub(crate) fn record_admission(result: &str) {
    ADMISSION_DECISIONS.with_label_values(&[result]).inc();
}

pub(crate) fn record_drop(reason: &str) {
    DROPPED_CALLS.with_label_values(&[reason]).inc();
}

pub fn gather() -> Vec<u8> {
    // Register families that have not been touched yet.
    Lazy::force(&DISPATCH_RESULTS);
    Lazy::force(&ADMISSION_DECISIONS);
    Lazy::force(&DROPPED_CALLS);
    Lazy::force(&QUEUE_FLUSHED);
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(target = "session.metrics", error = %err, "metrics encode error");
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_renders_counters() {
        record_result(ResultCode::Skipped);
        QUEUE_FLUSHED.inc();
        let text = String::from_utf8(gather()).unwrap();
        assert!(text.contains("session_dispatch_results_total"));
        assert!(text.contains("session_queue_flushed_total"));
    }
}
