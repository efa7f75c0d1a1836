//! Prometheus counters for bulk operator invocations.

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, TextEncoder};

/// Invocations per operator and outcome (`ok` or an error kind).
pub static INVOCATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec!("batcol_invocations_total", "Bulk operator invocations", &["operator", "outcome"]).unwrap()
});
/// Rows produced per operator.
pub static ROWS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec!("batcol_rows_total", "Rows produced by bulk operators", &["operator"]).unwrap()
});
/// Invocations per operator whose result contains at least one nil.
pub static NIL_RESULTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec!("batcol_nil_results_total", "Bulk operator results containing nil", &["operator"]).unwrap()
});

/// Record a successful invocation.
pub fn record_success(operator: &str, rows: usize, any_nil: bool) {
    INVOCATIONS_TOTAL.with_label_values(&[operator, "ok"]).inc();
    ROWS_TOTAL.with_label_values(&[operator]).inc_by(rows as u64);
    if any_nil {
        NIL_RESULTS_TOTAL.with_label_values(&[operator]).inc();
    }
}

/// Record a failed invocation.
pub fn record_failure(operator: &str, kind: &str) {
    INVOCATIONS_TOTAL.with_label_values(&[operator, kind]).inc();
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_render() {
        record_success("test.op", 3, true);
        record_failure("test.op", "illegal_argument");
        assert_eq!(INVOCATIONS_TOTAL.with_label_values(&["test.op", "ok"]).get(), 1);
        assert_eq!(ROWS_TOTAL.with_label_values(&["test.op"]).get(), 3);
        let text = render().unwrap();
        assert!(text.contains("batcol_invocations_total"));
        assert!(text.contains("illegal_argument"));
    }
}
