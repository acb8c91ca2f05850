//! Student-records service with tracing, throttling and a health check.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/students/42
//!   curl -i -X POST http://localhost:3000/students \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -i -X DELETE http://localhost:3000/students/42 -H 'authorization: x'
//!   curl -i http://localhost:3000/healthz
//!
//! Repeat the first request more than five times within a minute to see a
//! `429` together with `X-Next-Window` and `X-Hit-Remain`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use weir::middleware::{Throttling, boxed, require, trace};
use weir::throttle::Throttle;
use weir::{App, Config, Json, Method, Request, Response, Route, Server, Service, ServiceError, health};

#[derive(Deserialize)]
struct NewStudent {
    name: String,
}

#[derive(Serialize)]
struct Student {
    id: String,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), weir::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = Config::default();
    config.throttle.limit = 5;

    let throttle = Arc::new(Throttle::from_config(&config.throttle));
    throttle.spawn_sweeper(config.throttle.sweep_interval());

    let students = Service::builder("student")
        .middleware(boxed(Throttling::from_config(throttle, &config.throttle)))
        .route(
            Route::new("/students")
                .on_with(Method::Post, create_student, vec![boxed(require().body())]),
        )
        .route(
            Route::new("/students/{sid}")
                .get(get_student)
                .on_with(Method::Delete, delete_student, vec![boxed(require().header("authorization"))]),
        )
        .build()?;

    let app = App::from_config(&config)
        .middleware(boxed(trace))
        .service(health::service("/healthz")?)
        .service(students);

    Server::from_config(&config.server)?
        .max_body_bytes(64 * 1024)
        .serve(app)
        .await
}

// GET /students/{sid}
fn get_student(req: &Request) -> Result<Json<Student>, ServiceError> {
    let id = req.param("sid").unwrap_or_default();
    if id == "0" {
        return Err(ServiceError::not_found(format!("student {id} does not exist")));
    }
    Ok(Json(Student { id: id.to_owned(), name: "alice".to_owned() }))
}

// POST /students
fn create_student(req: &Request) -> Result<(u16, Json<Student>), ServiceError> {
    let new: NewStudent = req.unmarshal_body()?;
    Ok((201, Json(Student { id: "99".to_owned(), name: new.name })))
}

// DELETE /students/{sid}
fn delete_student(_req: &Request) -> Result<Response, ServiceError> {
    Ok(Response::status(204))
}
