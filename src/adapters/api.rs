use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, post, web};
use serde_json::{Map, Value};

use crate::app::services::{ServiceError, VehicleCommandHandler, VehicleQueryHandler};

#[derive(Clone)]
pub struct ApiState {
    pub vehicle_queries: Arc<dyn VehicleQueryHandler>,
    pub vehicle_commands: Arc<dyn VehicleCommandHandler>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(get_user_endpoint)
        .service(list_vehicles_endpoint)
        .service(get_vehicle_endpoint)
        .service(list_entities_endpoint)
        .service(get_entity_endpoint)
        .service(call_service_endpoint)
        .service(get_diagnostics_endpoint);
}

#[get("/health")]
async fn health(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "lastUpdateSuccess": state.vehicle_queries.last_update_success()
    }))
}

#[get("/user")]
async fn get_user_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.vehicle_queries.user() {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "user not loaded"
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/vehicles")]
async fn list_vehicles_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.vehicle_queries.vehicles() {
        Ok(vehicles) => HttpResponse::Ok().json(vehicles),
        Err(error) => service_error_response(error),
    }
}

#[get("/vehicles/{vin}")]
async fn get_vehicle_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.vehicle_queries.vehicle(&path) {
        Ok(Some(vehicle)) => HttpResponse::Ok().json(vehicle),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "vehicle not found"
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/entities")]
async fn list_entities_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.vehicle_queries.entities() {
        Ok(entities) => HttpResponse::Ok().json(entities),
        Err(error) => service_error_response(error),
    }
}

#[get("/entities/{entity_id}")]
async fn get_entity_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.vehicle_queries.entity(&path) {
        Ok(Some(entity)) => HttpResponse::Ok().json(entity),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "entity not found"
        })),
        Err(error) => service_error_response(error),
    }
}

/// Body is `{"entity_id": ..., <service data>}`. Vendor calls block until the
/// remote action settles, so they run on the blocking pool.
#[post("/services/{service}")]
async fn call_service_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<Map<String, Value>>,
) -> impl Responder {
    let service = path.into_inner();
    let mut data = body.into_inner();
    let Some(entity_id) = data
        .remove("entity_id")
        .and_then(|value| value.as_str().map(ToString::to_string))
    else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "entity_id is required"
        }));
    };

    let commands = Arc::clone(&state.vehicle_commands);
    let result =
        web::block(move || commands.call_service(&entity_id, &service, &data)).await;

    match result {
        Ok(Ok(outcome)) => HttpResponse::Ok().json(outcome),
        Ok(Err(error)) => service_error_response(error),
        Err(error) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("service call aborted: {error}")
        })),
    }
}

#[get("/diagnostics")]
async fn get_diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.vehicle_queries.diagnostics() {
        Ok(dump) => HttpResponse::Ok().json(dump),
        Err(error) => service_error_response(error),
    }
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
        ServiceError::State(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": error.to_string()
            }))
        }
        ServiceError::UnknownEntity(entity_id) => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("unknown entity {entity_id}")
            }))
        }
        error @ (ServiceError::UnsupportedService { .. } | ServiceError::PinRequired(_)) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": error.to_string()
            }))
        }
    }
}
