// Performance Metrics for checkout
//
// Counts discount outcomes, orders and reconciliation exceptions, and times the
// engine operations so slow quotes and confirmations show up in the logs.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Performance threshold for slow operations (250ms; confirmations call the gateway)
const SLOW_OPERATION_THRESHOLD_MS: u64 = 250;

/// Checkout operations that are timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Quote,
    ApplyDiscount,
    PaymentIntent,
    ConfirmOrder,
}

impl Operation {
    fn label(&self) -> &'static str {
        match self {
            Operation::Quote => "quote",
            Operation::ApplyDiscount => "apply discount",
            Operation::PaymentIntent => "payment intent",
            Operation::ConfirmOrder => "order confirmation",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

const OPERATION_COUNT: usize = 4;

#[derive(Debug, Default)]
struct OperationStats {
    count: AtomicU64,
    total_time_us: AtomicU64,
    slow: AtomicU64,
}

impl OperationStats {
    fn avg_time_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    fn snapshot(&self) -> OperationSummary {
        OperationSummary {
            count: self.count.load(Ordering::Relaxed),
            avg_time_ms: self.avg_time_ms(),
            slow: self.slow.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    operations: [OperationStats; OPERATION_COUNT],

    discounts_applied: AtomicU64,
    discounts_rejected: AtomicU64,
    discounts_auto_removed: AtomicU64,
    stock_adjustments: AtomicU64,
    orders_created: AtomicU64,
    reconciliation_exceptions: AtomicU64,
}

/// Performance metrics for the checkout engine
#[derive(Debug, Clone, Default)]
pub struct CheckoutMetrics {
    inner: Arc<MetricsInner>,
}

impl CheckoutMetrics {
    /// Create a new CheckoutMetrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing an operation; the duration is recorded when the timer drops
    pub fn start(&self, operation: Operation) -> OperationTimer {
        OperationTimer {
            start: Instant::now(),
            operation,
            metrics: self.clone(),
        }
    }

    fn record(&self, operation: Operation, duration: Duration) {
        let stats = &self.inner.operations[operation.index()];
        stats.count.fetch_add(1, Ordering::Relaxed);
        stats
            .total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_OPERATION_THRESHOLD_MS {
            stats.slow.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow {}: {}ms", operation.label(), duration.as_millis());
        }
    }

    pub fn record_discount_applied(&self) {
        self.inner.discounts_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discount_rejected(&self) {
        self.inner.discounts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discounts_auto_removed(&self, count: usize) {
        self.inner
            .discounts_auto_removed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_stock_adjustments(&self, count: usize) {
        self.inner
            .stock_adjustments
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_order_created(&self) {
        self.inner.orders_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconciliation_exception(&self) {
        self.inner
            .reconciliation_exceptions
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Share of submitted codes that were rejected (0.0 to 1.0)
    pub fn discount_rejection_rate(&self) -> f64 {
        let applied = self.inner.discounts_applied.load(Ordering::Relaxed);
        let rejected = self.inner.discounts_rejected.load(Ordering::Relaxed);
        let total = applied + rejected;

        if total == 0 {
            0.0
        } else {
            rejected as f64 / total as f64
        }
    }

    /// Get metrics summary
    pub fn summary(&self) -> MetricsSummary {
        let ops = &self.inner.operations;
        MetricsSummary {
            quotes: ops[Operation::Quote.index()].snapshot(),
            discount_applications: ops[Operation::ApplyDiscount.index()].snapshot(),
            payment_intents: ops[Operation::PaymentIntent.index()].snapshot(),
            order_confirmations: ops[Operation::ConfirmOrder.index()].snapshot(),
            discounts_applied: self.inner.discounts_applied.load(Ordering::Relaxed),
            discounts_rejected: self.inner.discounts_rejected.load(Ordering::Relaxed),
            discount_rejection_rate: self.discount_rejection_rate(),
            discounts_auto_removed: self.inner.discounts_auto_removed.load(Ordering::Relaxed),
            stock_adjustments: self.inner.stock_adjustments.load(Ordering::Relaxed),
            orders_created: self.inner.orders_created.load(Ordering::Relaxed),
            reconciliation_exceptions: self
                .inner
                .reconciliation_exceptions
                .load(Ordering::Relaxed),
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Checkout Metrics:\n\
             Quotes: {}, avg {:.2}ms, {} slow\n\
             Discounts: {} applied, {} rejected ({:.1}%), {} auto-removed\n\
             Payment intents: {}, avg {:.2}ms, {} slow\n\
             Orders: {} created, {} reconciliation exceptions",
            summary.quotes.count,
            summary.quotes.avg_time_ms,
            summary.quotes.slow,
            summary.discounts_applied,
            summary.discounts_rejected,
            summary.discount_rejection_rate * 100.0,
            summary.discounts_auto_removed,
            summary.payment_intents.count,
            summary.payment_intents.avg_time_ms,
            summary.payment_intents.slow,
            summary.orders_created,
            summary.reconciliation_exceptions,
        );
    }
}

/// Timer for tracking operation duration
pub struct OperationTimer {
    start: Instant,
    operation: Operation,
    metrics: CheckoutMetrics,
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.metrics.record(self.operation, self.start.elapsed());
    }
}

/// Counters and timings for one operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub count: u64,
    pub avg_time_ms: f64,
    pub slow: u64,
}

/// Summary of checkout metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub quotes: OperationSummary,
    pub discount_applications: OperationSummary,
    pub payment_intents: OperationSummary,
    pub order_confirmations: OperationSummary,
    pub discounts_applied: u64,
    pub discounts_rejected: u64,
    pub discount_rejection_rate: f64,
    pub discounts_auto_removed: u64,
    pub stock_adjustments: u64,
    pub orders_created: u64,
    pub reconciliation_exceptions: u64,
}
