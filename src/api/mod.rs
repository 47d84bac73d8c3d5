// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! REST API for the NAS service manager

use actix_web::{web, HttpRequest, HttpResponse, http::StatusCode};
use std::sync::Arc;

use crate::auth;
use crate::bootstrap::BootstrapGuard;
use crate::catalog::ServiceCatalog;
use crate::error::{Result, ServiceError};
use crate::lifecycle::{LifecycleController, OperationReport};

/// Shared application state
pub struct AppState {
    pub catalog: Arc<ServiceCatalog>,
    pub services: BootstrapGuard<LifecycleController>,
    pub admin_api_key: Option<String>,
}

// ─── Helpers ───

fn error_response(e: &ServiceError) -> HttpResponse {
    let status = StatusCode::from_u16(e.status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "message": e.to_string(),
    }))
}

fn operation_response(result: Result<OperationReport>) -> HttpResponse {
    match result {
        Ok(report) => {
            let status = StatusCode::from_u16(report.status_hint).unwrap_or(StatusCode::OK);
            HttpResponse::build(status).json(serde_json::json!({
                "success": true,
                "message": report.message,
            }))
        }
        Err(e) => error_response(&e),
    }
}

fn require_admin(req: &HttpRequest, state: &web::Data<AppState>) -> std::result::Result<(), HttpResponse> {
    if auth::is_admin(req, state.admin_api_key.as_deref()) {
        Ok(())
    } else {
        Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "message": "Authentication required"
        })))
    }
}

async fn controller(state: &web::Data<AppState>) -> std::result::Result<Arc<LifecycleController>, HttpResponse> {
    state.services.ensure_controller().await.map_err(|e| error_response(&e))
}

/// Unknown keys are answered from the catalog, without connecting to Portainer
fn known_service(state: &web::Data<AppState>, name: &str) -> std::result::Result<(), HttpResponse> {
    state.catalog.lookup(name).map(|_| ()).map_err(|e| error_response(&e))
}

// ─── Admin routes ───

/// GET /api/admin/available-services — catalog with installed flags
pub async fn available_services(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) { return resp; }
    let ctl = match controller(&state).await { Ok(c) => c, Err(resp) => return resp };
    match ctl.list_available().await {
        Ok(available) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "available_services": available,
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/admin/install/{name} — deploy a catalog service
pub async fn install_service(req: HttpRequest, state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) { return resp; }
    let name = path.into_inner();
    if let Err(resp) = known_service(&state, &name) { return resp; }
    let ctl = match controller(&state).await { Ok(c) => c, Err(resp) => return resp };
    operation_response(ctl.install(&name).await)
}

/// DELETE /api/admin/uninstall/{name} — remove a deployed service
pub async fn uninstall_service(req: HttpRequest, state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) { return resp; }
    let name = path.into_inner();
    if let Err(resp) = known_service(&state, &name) { return resp; }
    let ctl = match controller(&state).await { Ok(c) => c, Err(resp) => return resp };
    operation_response(ctl.uninstall(&name).await)
}

/// POST /api/admin/reconnect — drop a failed or stale Portainer connection
pub async fn reconnect(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) { return resp; }
    state.services.reset().await;
    match state.services.ensure_controller().await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Service manager connected",
            "attempts": state.services.attempts(),
        })),
        Err(e) => error_response(&e),
    }
}

// ─── Service routes ───

/// GET /api/services — live status of every catalog service
pub async fn list_services(state: web::Data<AppState>) -> HttpResponse {
    let ctl = match controller(&state).await { Ok(c) => c, Err(resp) => return resp };
    let services = ctl.describe_all().await;
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "services": services,
    }))
}

/// GET /api/services/{name} — live status of one service
pub async fn get_service(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let name = path.into_inner();
    if let Err(resp) = known_service(&state, &name) { return resp; }
    let ctl = match controller(&state).await { Ok(c) => c, Err(resp) => return resp };
    match ctl.describe(&name).await {
        Ok(service) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "service": service,
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/services/start/{name}
pub async fn start_service(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let name = path.into_inner();
    if let Err(resp) = known_service(&state, &name) { return resp; }
    let ctl = match controller(&state).await { Ok(c) => c, Err(resp) => return resp };
    operation_response(ctl.start(&name).await)
}

/// POST /api/services/stop/{name}
pub async fn stop_service(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let name = path.into_inner();
    if let Err(resp) = known_service(&state, &name) { return resp; }
    let ctl = match controller(&state).await { Ok(c) => c, Err(resp) => return resp };
    operation_response(ctl.stop(&name).await)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Admin
        .route("/api/admin/available-services", web::get().to(available_services))
        .route("/api/admin/install/{name}", web::post().to(install_service))
        .route("/api/admin/uninstall/{name}", web::delete().to(uninstall_service))
        .route("/api/admin/reconnect", web::post().to(reconnect))
        // Services
        .route("/api/services", web::get().to(list_services))
        .route("/api/services/{name}", web::get().to(get_service))
        .route("/api/services/start/{name}", web::post().to(start_service))
        .route("/api/services/stop/{name}", web::post().to(stop_service));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use std::time::Duration;

    use crate::bootstrap::RetryPolicy;
    use crate::catalog::ServiceCatalog;
    use crate::config::PortainerSettings;
    use crate::portainer::auth::{DEFAULT_TOKEN_MARGIN, DEFAULT_TOKEN_VALIDITY};
    use crate::portainer::fake::FakePortainer;

    const KEY: &str = "test-admin-key";

    fn state(fake: Arc<FakePortainer>) -> web::Data<AppState> {
        let settings = PortainerSettings {
            url: "https://portainer.test".into(),
            username: "admin".into(),
            password: "secret".into(),
            environment_id: 1,
            timeout: Duration::from_secs(5),
            insecure_tls: true,
            token_validity: DEFAULT_TOKEN_VALIDITY,
            token_margin: DEFAULT_TOKEN_MARGIN,
        };
        let builtin = ServiceCatalog::built_in().unwrap();
        let pihole_only = builtin.definitions().iter().filter(|d| d.key == "pihole").cloned().collect();
        let catalog = Arc::new(ServiceCatalog::new(pihole_only).unwrap());
        let policy = RetryPolicy { max_attempts: 1, delay: Duration::ZERO, retry_after: None };

        let factory_catalog = catalog.clone();
        let services = BootstrapGuard::new(policy, move || {
            let fake = fake.clone();
            let settings = settings.clone();
            let catalog = factory_catalog.clone();
            async move { LifecycleController::connect(fake, &settings, catalog).await }
        });
        web::Data::new(AppState { catalog, services, admin_api_key: Some(KEY.to_string()) })
    }

    #[actix_web::test]
    async fn admin_routes_require_key() {
        let app = test::init_service(App::new().app_data(state(FakePortainer::new())).configure(configure)).await;
        let req = test::TestRequest::post().uri("/api/admin/install/pihole").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn install_then_conflict_then_list() {
        let fake = FakePortainer::new();
        let app = test::init_service(App::new().app_data(state(fake.clone())).configure(configure)).await;

        let install = || test::TestRequest::post()
            .uri("/api/admin/install/pihole")
            .insert_header((auth::ADMIN_KEY_HEADER, KEY))
            .to_request();
        assert_eq!(test::call_service(&app, install()).await.status(), StatusCode::CREATED);
        assert_eq!(test::call_service(&app, install()).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/api/services").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["services"][0]["key"], "pihole");
        assert_eq!(body["services"][0]["state"], "Running");
        assert_eq!(body["services"][0]["display_name"], "Pi-hole");
    }

    #[actix_web::test]
    async fn unknown_service_is_404_without_contacting_portainer() {
        let fake = FakePortainer::new();
        fake.set_login_fails(true);
        let app = test::init_service(App::new().app_data(state(fake.clone())).configure(configure)).await;

        let req = test::TestRequest::post().uri("/api/services/start/nextcloud").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        let req = test::TestRequest::get().uri("/api/services/nextcloud").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        let req = test::TestRequest::post()
            .uri("/api/admin/install/nextcloud")
            .insert_header((auth::ADMIN_KEY_HEADER, KEY))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(fake.request_count(), 0);
    }

    #[actix_web::test]
    async fn available_services_is_502_when_portainer_is_unreachable() {
        let fake = FakePortainer::new();
        let app = test::init_service(App::new().app_data(state(fake.clone())).configure(configure)).await;
        fake.add_stack("pihole-stack", &["running"]);
        let available = || test::TestRequest::get()
            .uri("/api/admin/available-services")
            .insert_header((auth::ADMIN_KEY_HEADER, KEY))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, available()).await;
        assert_eq!(body["available_services"][0]["installed"], true);

        fake.set_unreachable(true);
        assert_eq!(test::call_service(&app, available()).await.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn single_service_status() {
        let fake = FakePortainer::new();
        fake.add_stack("pihole-stack", &[]);
        let app = test::init_service(App::new().app_data(state(fake)).configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/services/pihole").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["service"]["state"], "Degraded");
        assert_eq!(body["service"]["total_count"], 0);
    }

    #[actix_web::test]
    async fn reconnect_recovers_after_portainer_comes_up() {
        let fake = FakePortainer::new();
        fake.set_login_fails(true);
        let app = test::init_service(App::new().app_data(state(fake.clone())).configure(configure)).await;
        let list = || test::TestRequest::get().uri("/api/services").to_request();
        assert_eq!(test::call_service(&app, list()).await.status(), StatusCode::SERVICE_UNAVAILABLE);

        fake.set_login_fails(false);
        // Still unavailable until someone asks for a reconnect
        assert_eq!(test::call_service(&app, list()).await.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = test::TestRequest::post()
            .uri("/api/admin/reconnect")
            .insert_header((auth::ADMIN_KEY_HEADER, KEY))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(test::call_service(&app, list()).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn unreachable_portainer_is_503() {
        let fake = FakePortainer::new();
        fake.set_login_fails(true);
        let app = test::init_service(App::new().app_data(state(fake)).configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/services").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
