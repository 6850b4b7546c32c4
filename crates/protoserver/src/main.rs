use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{
    delete, get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult,
};
use futures::StreamExt;
use protocore::{FlowError, ModelCatalog, Workflow, WorkflowError, WorkflowId};
use protonodes::{register_all, EchoGateway};
use protoruntime::{ExecutionHandle, FlowRuntime, NodeMetadata, NodeRegistry, RuntimeConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE: &str = "Proto Execution Engine";

/// Application state shared across handlers
struct AppState {
    runtime: FlowRuntime,
    catalog: ModelCatalog,
}

/// Server settings read from the environment
struct ServerConfig {
    bind_address: String,
    cors_origins: Vec<String>,
}

impl ServerConfig {
    fn from_env() -> Self {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8001".to_string());
        let cors_origins = std::env::var("CORS_ORIGINS")
            .ok()
            .map(|raw| parse_origins(&raw))
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        Self {
            bind_address,
            cors_origins,
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

/// Response for workflow creation
#[derive(Debug, Serialize)]
struct WorkflowResponse {
    id: WorkflowId,
    message: String,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct NodeDefinition {
    name: String,
    #[serde(flatten)]
    metadata: NodeMetadata,
}

/// Service status
#[get("/")]
async fn root() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "service": SERVICE,
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/healthz",
            "nodes": "/nodes",
            "models": "/models",
            "execute": "/execute",
            "workflows": "/workflows"
        }
    }))
}

/// Health check endpoint
#[get("/healthz")]
async fn health_check(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE,
        "node_types": data.runtime.registry().list_node_types().len(),
    }))
}

/// Node definitions for the editor palette
#[get("/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> impl Responder {
    let registry = data.runtime.registry();
    let nodes: Vec<NodeDefinition> = registry
        .list_node_types()
        .into_iter()
        .filter_map(|name| {
            let metadata = registry.get_metadata(&name)?;
            Some(NodeDefinition { name, metadata })
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({ "nodes": nodes }))
}

/// Model catalog with capabilities and valid parameters
#[get("/models")]
async fn list_models(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "models": &data.catalog }))
}

/// Execute a posted workflow and stream its events as Server-Sent Events
#[post("/execute")]
async fn execute(data: web::Data<AppState>, workflow: web::Json<Workflow>) -> impl Responder {
    let workflow = workflow.into_inner();
    info!(
        nodes = workflow.nodes.len(),
        edges = workflow.edges.len(),
        "Execution requested"
    );

    match data.runtime.execute(workflow) {
        Ok(handle) => event_stream(handle),
        Err(e) => execution_error(e),
    }
}

/// List saved workflows
#[get("/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> impl Responder {
    let workflow_list: Vec<_> = data
        .runtime
        .list_workflows()
        .await
        .iter()
        .map(|w| {
            serde_json::json!({
                "id": w.id,
                "name": w.name,
                "description": w.description,
                "nodes": w.nodes.len(),
                "edges": w.edges.len(),
            })
        })
        .collect();

    HttpResponse::Ok().json(workflow_list)
}

/// Save a workflow after checking it can run
#[post("/workflows")]
async fn create_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    let workflow = workflow.into_inner();

    if let Err(e) = data.runtime.validate(&workflow) {
        warn!("Rejected workflow {}: {}", workflow.name, e);
        return Ok(execution_error(e));
    }

    info!("Creating workflow: {} ({})", workflow.name, workflow.id);
    let workflow_id = data.runtime.register_workflow(workflow).await;

    Ok(HttpResponse::Created().json(WorkflowResponse {
        id: workflow_id,
        message: "Workflow created successfully".to_string(),
    }))
}

/// Get a specific workflow
#[get("/workflows/{id}")]
async fn get_workflow(data: web::Data<AppState>, path: web::Path<WorkflowId>) -> impl Responder {
    let workflow_id = path.into_inner();

    match data.runtime.get_workflow(workflow_id).await {
        Some(workflow) => HttpResponse::Ok().json(workflow),
        None => not_found(workflow_id),
    }
}

/// Delete a workflow
#[delete("/workflows/{id}")]
async fn delete_workflow(data: web::Data<AppState>, path: web::Path<WorkflowId>) -> impl Responder {
    let workflow_id = path.into_inner();

    match data.runtime.remove_workflow(workflow_id).await {
        Some(_) => {
            info!("Deleted workflow: {}", workflow_id);
            HttpResponse::Ok().json(serde_json::json!({
                "message": "Workflow deleted successfully"
            }))
        }
        None => not_found(workflow_id),
    }
}

/// Execute a saved workflow, streaming events
#[post("/workflows/{id}/execute")]
async fn execute_workflow(data: web::Data<AppState>, path: web::Path<WorkflowId>) -> impl Responder {
    let workflow_id = path.into_inner();
    info!("Executing workflow: {}", workflow_id);

    match data.runtime.execute_workflow(workflow_id).await {
        Ok(handle) => event_stream(handle),
        Err(e) => execution_error(e),
    }
}

/// One `data:` frame per event. Dropping the body (client gone) drops the
/// run with it.
fn event_stream(handle: ExecutionHandle) -> HttpResponse {
    info!(execution_id = %handle.execution_id(), "Streaming execution");
    let frames = handle.map(|event| event.to_sse_frame().map(web::Bytes::from));

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(frames)
}

fn execution_error(e: FlowError) -> HttpResponse {
    let mut response = match &e {
        FlowError::Workflow(WorkflowError::NotFound(_)) => HttpResponse::NotFound(),
        FlowError::Workflow(_) | FlowError::Node(_) => HttpResponse::UnprocessableEntity(),
        _ => {
            error!("Execution failed: {}", e);
            HttpResponse::InternalServerError()
        }
    };
    response.json(ErrorResponse {
        error: e.to_string(),
    })
}

fn not_found(workflow_id: WorkflowId) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: format!("Workflow {} not found", workflow_id),
    })
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(root)
        .service(health_check)
        .service(list_node_types)
        .service(list_models)
        .service(execute)
        .service(list_workflows)
        .service(create_workflow)
        .service(get_workflow)
        .service(delete_workflow)
        .service(execute_workflow);
}

fn app_state(config: RuntimeConfig) -> web::Data<AppState> {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, Arc::new(EchoGateway::new()));

    web::Data::new(AppState {
        runtime: FlowRuntime::with_registry(Arc::new(registry), config),
        catalog: ModelCatalog::builtin(),
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting {}", SERVICE);

    let config = ServerConfig::from_env();
    let app_state = app_state(RuntimeConfig::from_env());
    info!("✅ Runtime initialized with standard nodes");

    info!("🌐 Server starting on http://{}", config.bind_address);
    let origins = config.cors_origins.clone();

    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(routes)
    })
    .bind(&config.bind_address)?
    .run()
    .await?;

    info!("👋 Shutting down {}", SERVICE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn quick_state() -> web::Data<AppState> {
        app_state(RuntimeConfig {
            progress_interval: Duration::ZERO,
        })
    }

    fn frames(body: &[u8]) -> Vec<Value> {
        std::str::from_utf8(body)
            .unwrap()
            .split("\n\n")
            .filter(|frame| !frame.is_empty())
            .map(|frame| serde_json::from_str(frame.strip_prefix("data: ").unwrap()).unwrap())
            .collect()
    }

    fn echo_workflow() -> Value {
        json!({
            "nodes": {
                "text": {"data": {"nodeType": "ProtoDynamicTextNode", "nodeInputs": {"text": "hello there"}}},
                "agent": {"data": {"nodeType": "ProtoAgentNode", "nodeInputs": {"prompt": "{{in}}"}}},
                "out": {"data": {"nodeType": "ProtoOutputNode", "nodeInputs": {}}}
            },
            "edges": [
                {"source": "text", "target": "agent", "targetHandle": "in"},
                {"source": "agent", "sourceHandle": "response", "target": "out", "targetHandle": "content"}
            ]
        })
    }

    #[actix_web::test]
    async fn test_origins_are_trimmed() {
        assert_eq!(
            parse_origins(" http://a.test , ,http://b.test"),
            vec!["http://a.test", "http://b.test"]
        );
    }

    #[actix_web::test]
    async fn test_status_endpoints() {
        let app = test::init_service(App::new().app_data(quick_state()).configure(routes)).await;

        let status: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(status["status"], "running");

        let health: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/healthz").to_request()).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["node_types"], 4);

        let nodes: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/nodes").to_request()).await;
        let names: Vec<&str> = nodes["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec!["ProtoAgentNode", "ProtoDynamicTextNode", "ProtoOutputNode", "ProtoSchemaNode"]
        );

        let models: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/models").to_request()).await;
        assert_eq!(models["models"]["claude-haiku-4-5"]["provider"], "anthropic");
        assert_eq!(models["models"]["gpt-5"]["supports_temperature"], false);
    }

    #[actix_web::test]
    async fn test_execute_streams_events() {
        let app = test::init_service(App::new().app_data(quick_state()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/execute")
            .set_json(echo_workflow())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let events = frames(&test::read_body(resp).await);
        assert_eq!(events.first().unwrap()["event"], "workflow_start");
        assert_eq!(events.last().unwrap()["event"], "workflow_complete");

        let streamed: Vec<&Value> = events
            .iter()
            .filter(|e| e["event"] == "node_stream")
            .map(|e| &e["content"])
            .collect();
        assert_eq!(streamed, vec!["hello ", "hello there"]);

        let out = events
            .iter()
            .find(|e| e["event"] == "node_complete" && e["node_id"] == "out")
            .unwrap();
        assert_eq!(out["output"]["content"], "hello there");
    }

    #[actix_web::test]
    async fn test_cycle_is_rejected_before_streaming() {
        let app = test::init_service(App::new().app_data(quick_state()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/execute")
            .set_json(json!({
                "nodes": {
                    "a": {"data": {"nodeType": "ProtoDynamicTextNode", "nodeInputs": {}}},
                    "b": {"data": {"nodeType": "ProtoDynamicTextNode", "nodeInputs": {}}}
                },
                "edges": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("cycle"));
    }

    #[actix_web::test]
    async fn test_saved_workflow_lifecycle() {
        let app = test::init_service(App::new().app_data(quick_state()).configure(routes)).await;

        let mut workflow = echo_workflow();
        workflow["name"] = json!("saved");
        let created: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post().uri("/workflows").set_json(&workflow).to_request(),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let listed: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/workflows").to_request()).await;
        assert_eq!(listed[0]["nodes"], 3);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/workflows/{}/execute", id))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let events = frames(&test::read_body(resp).await);
        assert_eq!(events.last().unwrap()["event"], "workflow_complete");

        let resp = test::call_service(
            &app,
            test::TestRequest::delete().uri(&format!("/workflows/{}", id)).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/workflows/{}", id)).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_unknown_node_types_cannot_be_saved() {
        let app = test::init_service(App::new().app_data(quick_state()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/workflows")
            .set_json(json!({
                "nodes": {"x": {"data": {"nodeType": "Mystery", "nodeInputs": {}}}},
                "edges": []
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
