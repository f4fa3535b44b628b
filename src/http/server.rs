use actix_web::{web, App as HttpApp, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::app::App;

/// Start the HTTP server
/// This should be called in a separate thread/runtime to avoid conflicts
pub async fn start_http_server(app: Arc<App>, host: String, port: u16) -> std::io::Result<()> {
    tracing::info!("🌐 Starting HTTP server on http://{}:{}", host, port);

    HttpServer::new(move || HttpApp::new().configure(routes(app.clone())))
        .bind((host.as_str(), port))?
        .run()
        .await
}

/// Route table, shared by the server and the handler tests
pub fn routes(app: Arc<App>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(app))
            .route("/publish", web::post().to(publish_handler))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler));
    }
}

async fn publish_handler(app: web::Data<Arc<App>>, body: String) -> impl Responder {
    match app.bus.publish(body.as_str()) {
        Ok(()) => {
            tracing::info!("Event published: {}", body);
            HttpResponse::Accepted().finish()
        }
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": e.to_string(),
        })),
    }
}

async fn metrics_handler(app: web::Data<Arc<App>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = app.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(app: web::Data<Arc<App>>) -> impl Responder {
    let health = app.health();
    if health.overall_status.is_healthy() {
        HttpResponse::Ok().json(health)
    } else {
        HttpResponse::ServiceUnavailable().json(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::http::StatusCode;
    use actix_web::test;

    fn app() -> Arc<App> {
        Arc::new(App::from_config(AppConfig::default()).unwrap())
    }

    #[actix_web::test]
    async fn test_publish_accepts_raw_text() {
        let app = app();
        let svc = test::init_service(HttpApp::new().configure(routes(app.clone()))).await;

        let req = test::TestRequest::post()
            .uri("/publish")
            .set_payload("Event 1")
            .to_request();
        let resp = test::call_service(&svc, req).await;

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(app.bus.backlog_len(), 1);
    }

    #[actix_web::test]
    async fn test_publish_on_closed_bus_is_unavailable() {
        let app = app();
        app.bus.close();
        let svc = test::init_service(HttpApp::new().configure(routes(app.clone()))).await;

        let req = test::TestRequest::post()
            .uri("/publish")
            .set_payload("late")
            .to_request();
        let resp = test::call_service(&svc, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_bus_counters() {
        let app = app();
        app.bus.publish("x").unwrap();
        let svc = test::init_service(HttpApp::new().configure(routes(app.clone()))).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&svc, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("bus_events_published_total 1"));
    }

    #[actix_web::test]
    async fn test_health_reports_pipeline_state() {
        let app = app();
        let svc = test::init_service(HttpApp::new().configure(routes(app.clone()))).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&svc, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        app.start();
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&svc, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
