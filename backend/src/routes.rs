use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;
use shared::SelectRequest;
use std::path::PathBuf;
use uuid::Uuid;

use crate::pipeline::normalize;
use crate::storage::{Catalog, StorageError, UploadStore};
use crate::tasks::{PoolError, TaskService, TaskServiceError};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Reasons a submission is refused before a task is queued.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    #[error("File too large")]
    TooLarge,
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Selected image does not exist: {0}")]
    CatalogNotFound(String),
    #[error("Selected image rejected: {0}")]
    CatalogRejected(String),
    #[error("Server is busy, try again later")]
    QueueFull,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for SubmitError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidFormat => SubmitError::InvalidFile(e.to_string()),
            StorageError::FileTooLarge => SubmitError::TooLarge,
            StorageError::OutsideCatalog(_) | StorageError::Blocked(_) => {
                SubmitError::CatalogRejected(e.to_string())
            }
            StorageError::NotFound(path) => SubmitError::CatalogNotFound(path),
            StorageError::Io { .. } => SubmitError::Io(e.to_string()),
        }
    }
}

impl From<TaskServiceError> for SubmitError {
    fn from(e: TaskServiceError) -> Self {
        match e {
            TaskServiceError::Pool(PoolError::QueueFull) => SubmitError::QueueFull,
            other => SubmitError::Internal(other.to_string()),
        }
    }
}

impl ResponseError for SubmitError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubmitError::InvalidFile(_)
            | SubmitError::Decode(_)
            | SubmitError::CatalogRejected(_) => StatusCode::BAD_REQUEST,
            SubmitError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            SubmitError::CatalogNotFound(_) => StatusCode::NOT_FOUND,
            SubmitError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            SubmitError::Io(_) | SubmitError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, upload_dir: PathBuf, catalog_dir: PathBuf) {
    cfg.service(web::resource("/api/tasks/upload").route(web::post().to(upload_image)))
        .service(web::resource("/api/tasks/select").route(web::post().to(select_image)))
        .service(web::resource("/api/tasks/{task_id}").route(web::get().to(get_task)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(Files::new("/uploads", upload_dir))
        .service(Files::new("/data", catalog_dir));
}

async fn upload_image(
    service: web::Data<TaskService>,
    store: web::Data<UploadStore>,
    mut payload: Multipart,
) -> Result<HttpResponse, SubmitError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| SubmitError::InvalidFile(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
            .ok_or_else(|| SubmitError::InvalidFile("No file selected".into()))?;
        UploadStore::extract_file_extension(&file_name)?;

        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| SubmitError::InvalidFile(e.to_string()))?;
            image_data.extend_from_slice(&data);
            store.validate_image_size(&image_data)?;
        }

        let saver = store.clone();
        let stored = web::block(move || {
            // Decoded only to reject bad input now; the worker decodes again.
            normalize::decode(&image_data).map_err(|e| SubmitError::Decode(e.to_string()))?;
            Ok::<_, SubmitError>(saver.save(&file_name, &image_data)?)
        })
        .await
        .map_err(|e| SubmitError::Internal(e.to_string()))??;

        let accepted = match service.submit(stored.url.clone(), stored.path.clone()) {
            Ok(accepted) => accepted,
            Err(e) => {
                store.discard(&stored);
                return Err(e.into());
            }
        };
        info!("Accepted upload {} as task {}", stored.file_name, accepted.task_id);
        return Ok(HttpResponse::Accepted().json(accepted));
    }

    Err(SubmitError::InvalidFile("No file selected".into()))
}

async fn select_image(
    service: web::Data<TaskService>,
    catalog: web::Data<Catalog>,
    request: web::Json<SelectRequest>,
) -> Result<HttpResponse, SubmitError> {
    let selected = request.into_inner().selected_image;
    let path = catalog.resolve(&selected)?;

    let checked = path.clone();
    web::block(move || normalize::open(&checked).map(drop))
        .await
        .map_err(|e| SubmitError::Internal(e.to_string()))?
        .map_err(|e| SubmitError::Decode(e.to_string()))?;

    let accepted = service.submit(Catalog::url_for(&selected), path)?;
    info!("Accepted catalog image {} as task {}", selected, accepted.task_id);
    Ok(HttpResponse::Accepted().json(accepted))
}

async fn get_task(service: web::Data<TaskService>, path: web::Path<String>) -> HttpResponse {
    let task_id_str = path.into_inner();
    let task_id = match Uuid::parse_str(&task_id_str) {
        Ok(uuid) => uuid,
        Err(_) => {
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: "Invalid UUID format".into(),
            })
        }
    };

    match service.status(task_id) {
        Ok(Some(task)) => HttpResponse::Ok().json(task),
        Ok(None) => {
            warn!("Status requested for unknown task {}", task_id);
            HttpResponse::NotFound().json(json!({ "status": "not found" }))
        }
        Err(e) => {
            error!("Error retrieving task {}: {}", task_id, e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Error retrieving task: {}", e),
            })
        }
    }
}

async fn health(service: web::Data<TaskService>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "tasks": service.registry().len(),
        "queued": service.pool().queued(),
        "workers": service.pool().workers(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::class_mapping::ClassMapping;
    use crate::backends::stub::{StubClassifier, StubSegmenter};
    use crate::config::{PipelineSettings, SelectorSettings, WorkerSettings};
    use crate::pipeline::Orchestrator;
    use crate::tasks::{TaskRegistry, WorkerPool};
    use actix_web::{test, App};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use shared::{SubmitResponse, TaskStatus, TaskStatusResponse};
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::Arc;

    const BOUNDARY: &str = "aviscan-test-boundary";

    struct Fixture {
        _dir: tempfile::TempDir,
        service: TaskService,
        store: UploadStore,
        catalog: Catalog,
    }

    /// Zero workers, so submitted tasks stay queued and processing.
    fn fixture() -> Fixture {
        fixture_with_capacity(8)
    }

    fn fixture_with_capacity(queue_capacity: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog_dir = dir.path().join("static");
        std::fs::create_dir_all(catalog_dir.join("test/ROBIN")).unwrap();
        std::fs::write(catalog_dir.join("test/ROBIN/1.png"), png_bytes()).unwrap();
        std::fs::write(catalog_dir.join("test/ROBIN/2.png"), png_bytes()).unwrap();

        let registry = TaskRegistry::new();
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            Arc::new(StubSegmenter::default()),
            Arc::new(StubClassifier),
            Arc::new(ClassMapping::default()),
            PipelineSettings::default(),
            SelectorSettings::default(),
        ));
        let pool = WorkerPool::start(
            &WorkerSettings {
                count: 0,
                queue_capacity,
            },
            orchestrator,
        );

        let blocked: HashSet<String> = ["test/ROBIN/2.png".to_string()].into();
        Fixture {
            service: TaskService::new(registry, pool),
            store: UploadStore::new(dir.path().join("uploads"), 1024 * 1024).unwrap(),
            catalog: Catalog::new(catalog_dir, blocked),
            _dir: dir,
        }
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(32, 24))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn multipart_body(file_name: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(file_name: &str, data: &[u8]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/tasks/upload")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body(file_name, data))
    }

    macro_rules! app {
        ($fixture:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($fixture.service.clone()))
                    .app_data(web::Data::new($fixture.store.clone()))
                    .app_data(web::Data::new($fixture.catalog.clone()))
                    .configure(|cfg| {
                        configure_routes(
                            cfg,
                            $fixture.store.root().to_path_buf(),
                            $fixture.catalog.root().to_path_buf(),
                        )
                    }),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_upload_is_accepted_and_pollable() {
        let fixture = fixture();
        let app = app!(fixture);

        let req = upload_request("bird.PNG", &png_bytes()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let submitted: SubmitResponse = test::read_body_json(resp).await;
        assert_eq!(submitted.status_url, format!("/api/tasks/{}", submitted.task_id));

        let req = test::TestRequest::get().uri(&submitted.status_url).to_request();
        let status: TaskStatusResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status.status, TaskStatus::Processing);
        assert!(!status.steps.compress_image && !status.steps.prediction);
        assert!(status.image_url.starts_with("/uploads/"));
        assert!(status.image_url.ends_with(".png"));

        let req = test::TestRequest::get().uri(&status.image_url).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_upload_rejects_bad_extension_and_garbage() {
        let fixture = fixture();
        let app = app!(fixture);

        let req = upload_request("notes.txt", b"hello").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = upload_request("bird.jpg", b"not an image").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert!(fixture.service.registry().is_empty());
        assert_eq!(std::fs::read_dir(fixture.store.root()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn test_busy_upload_leaves_no_file_behind() {
        let fixture = fixture_with_capacity(1);
        let app = app!(fixture);

        let req = upload_request("first.png", &png_bytes()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let req = upload_request("second.png", &png_bytes()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let files = std::fs::read_dir(fixture.store.root()).unwrap().count();
        assert_eq!(fixture.service.registry().len(), 1);
        assert_eq!(files, 1);
    }

    #[actix_web::test]
    async fn test_busy_select_is_rejected_without_record() {
        let fixture = fixture_with_capacity(1);
        let app = app!(fixture);

        for expected in [StatusCode::ACCEPTED, StatusCode::SERVICE_UNAVAILABLE] {
            let req = test::TestRequest::post()
                .uri("/api/tasks/select")
                .set_json(SelectRequest {
                    selected_image: "test/ROBIN/1.png".into(),
                })
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
        }
        assert_eq!(fixture.service.registry().len(), 1);
        assert!(fixture.catalog.resolve("test/ROBIN/1.png").is_ok());
    }

    #[actix_web::test]
    async fn test_select_catalog_image() {
        let fixture = fixture();
        let app = app!(fixture);

        let req = test::TestRequest::post()
            .uri("/api/tasks/select")
            .set_json(SelectRequest {
                selected_image: "test/ROBIN/1.png".into(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let submitted: SubmitResponse = test::read_body_json(resp).await;

        let id = Uuid::parse_str(&submitted.task_id).unwrap();
        let status = fixture.service.status(id).unwrap().unwrap();
        assert_eq!(status.image_url, "/data/test/ROBIN/1.png");
    }

    #[actix_web::test]
    async fn test_select_rejections() {
        let fixture = fixture();
        let app = app!(fixture);

        for (selected, expected) in [
            ("test/ROBIN/9.png", StatusCode::NOT_FOUND),
            ("test/ROBIN/2.png", StatusCode::BAD_REQUEST),
            ("../static/test/ROBIN/1.png", StatusCode::BAD_REQUEST),
            ("", StatusCode::BAD_REQUEST),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/tasks/select")
                .set_json(SelectRequest {
                    selected_image: selected.into(),
                })
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected, "{selected:?}");
        }
        assert!(fixture.service.registry().is_empty());
    }

    #[actix_web::test]
    async fn test_get_unknown_and_malformed_task() {
        let fixture = fixture();
        let app = app!(fixture);

        let req = test::TestRequest::get()
            .uri(&format!("/api/tasks/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "status": "not found" }));

        let req = test::TestRequest::get().uri("/api/tasks/not-a-uuid").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health_reports_counts() {
        let fixture = fixture();
        let app = app!(fixture);

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tasks"], 0);
        assert_eq!(body["workers"], 0);
    }

    #[actix_web::test]
    async fn test_submit_error_status_codes() {
        assert_eq!(SubmitError::QueueFull.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            SubmitError::from(StorageError::NotFound("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SubmitError::from(StorageError::Blocked("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SubmitError::from(StorageError::FileTooLarge).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
