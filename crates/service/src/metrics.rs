use std::sync::LazyLock;

use prometheus::{IntCounter, register_int_counter};

/// Process-wide Prometheus registry binding: only `CreateSessionHandler`
/// needs a global registry, so it gets one well-defined init site rather
/// than being threaded through every constructor.
pub static SESSIONS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "sessions_created_total",
        "Total number of Create Session Requests accepted."
    )
    .expect("unable to register sessions_created_total counter")
});
