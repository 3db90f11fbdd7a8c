//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedbox_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "fedbox_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Mailbox Metrics
    pub static ref MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "fedbox_messages_sent_total",
        "Total number of messages persisted"
    ).expect("metric can be created");
    pub static ref RECEIVER_INSERTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedbox_receiver_inserts_total", "Receiver rows written during fan-out"),
        &["status"]
    ).expect("metric can be created");

    // Auth Metrics
    pub static ref AUTH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedbox_auth_failures_total", "Total number of rejected identity claims"),
        &["reason"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref ACTIVITIES_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("fedbox_activities_received_total", "Total number of activities accepted by inbox/outbox"),
        &["box", "activity_type"]
    ).expect("metric can be created");
    pub static ref ACTIVITIES_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("fedbox_activities_delivered_total", "Outbound activity deliveries"),
        &["activity_type", "status"]
    ).expect("metric can be created");
    pub static ref DELIVERY_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "fedbox_delivery_duration_seconds",
            "Outbound delivery duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["activity_type"]
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref STORAGE_CONNECT_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("fedbox_storage_connect_attempts_total", "Backend connection attempts at startup"),
        &["status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedbox_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers collectors.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .expect("HTTP_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
            .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(MESSAGES_SENT_TOTAL.clone()))
            .expect("MESSAGES_SENT_TOTAL can be registered");
        REGISTRY
            .register(Box::new(RECEIVER_INSERTS_TOTAL.clone()))
            .expect("RECEIVER_INSERTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
            .expect("AUTH_FAILURES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ACTIVITIES_RECEIVED.clone()))
            .expect("ACTIVITIES_RECEIVED can be registered");
        REGISTRY
            .register(Box::new(ACTIVITIES_DELIVERED.clone()))
            .expect("ACTIVITIES_DELIVERED can be registered");
        REGISTRY
            .register(Box::new(DELIVERY_DURATION_SECONDS.clone()))
            .expect("DELIVERY_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(STORAGE_CONNECT_ATTEMPTS.clone()))
            .expect("STORAGE_CONNECT_ATTEMPTS can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
