use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod repo;
mod routes;
mod upload;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::repo::attendance::AttendanceStore;
use crate::upload::dispatcher::UploadDispatcher;
use crate::upload::storage::{FsObjectStorage, ObjectStorage};
use crate::upload::worker::UploadWorker;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "WFH Attendance API"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await;

    let storage: Arc<dyn ObjectStorage> = Arc::new(FsObjectStorage::new(
        &config.storage_root,
        &config.storage_public_url,
        &config.jwt_secret,
    ));

    // Single-consumer upload queue: one receiver, claimed by one worker task.
    let (dispatcher, upload_jobs) = UploadDispatcher::channel(config.upload_queue_capacity);
    let store: Arc<dyn AttendanceStore> = Arc::new(pool.clone());
    let worker = UploadWorker::new(
        store,
        storage.clone(),
        Duration::from_secs(config.upload_timeout_secs),
    );
    actix_web::rt::spawn(worker.run(upload_jobs));

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(dispatcher.clone()))
            .app_data(Data::from(storage.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
