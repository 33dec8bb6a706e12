use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use aviscan::backends::{self, class_mapping::ClassMapping};
use aviscan::config::AppConfig;
use aviscan::pipeline::artifacts::ScratchDir;
use aviscan::pipeline::Orchestrator;
use aviscan::routes::configure_routes;
use aviscan::storage::{Catalog, UploadStore};
use aviscan::tasks::{TaskRegistry, TaskService, WorkerPool};
use std::sync::Arc;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    let class_mapping = Arc::new(ClassMapping::load_or_empty(&config.models.class_mapping));
    let (segmenter, classifier) = backends::load(&config.models, class_mapping.clone())
        .map_err(|e| startup_error("Model loading failed", e))?;

    let registry = TaskRegistry::new();
    registry.start_sweeper(
        std::time::Duration::from_secs(config.registry.sweep_interval_secs.max(1)),
        chrono::Duration::seconds(config.registry.retention_secs as i64),
    );

    let mut orchestrator = Orchestrator::new(
        registry.clone(),
        segmenter,
        classifier,
        class_mapping,
        config.pipeline.clone(),
        config.selector.clone(),
    );
    if config.pipeline.persist_intermediates {
        let scratch = ScratchDir::new(&config.storage.scratch_dir)
            .map_err(|e| startup_error("Cannot create scratch directory", e))?;
        log::info!("Writing intermediates under {}", scratch.root().display());
        orchestrator = orchestrator.with_scratch(scratch);
    }

    let pool = WorkerPool::start(&config.workers, Arc::new(orchestrator));
    let service = TaskService::new(registry, pool);

    let store = UploadStore::new(&config.storage.upload_dir, config.storage.max_upload_bytes)
        .map_err(|e| startup_error("Cannot create upload directory", e))?;
    let catalog = Catalog::open(&config.storage.catalog_dir, &config.storage.invalid_images_list)
        .map_err(|e| startup_error("Cannot load catalog", e))?;

    let upload_dir = config.storage.upload_dir.clone();
    let catalog_dir = config.storage.catalog_dir.clone();
    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(catalog.clone()))
            .configure(|cfg| configure_routes(cfg, upload_dir.clone(), catalog_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
