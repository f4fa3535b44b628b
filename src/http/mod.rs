// HTTP ingress and observability endpoints:
//   POST /publish   raw text body → EventBus::publish
//   GET  /metrics   Prometheus text format
//   GET  /health    JSON SystemHealth

mod server;

pub use server::{routes, start_http_server};
