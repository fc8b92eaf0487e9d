use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

const SCHEMA: &str = "http://schemas.dmtf.org/cimi/1";

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "secret";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    #[serde(rename = "resourceURI")]
    pub resource_uri: String,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: String,
    pub cpu: u32,
    pub memory: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(rename = "resourceURI")]
    pub resource_uri: String,
    pub id: String,
    pub name: String,
    pub state: String,
    pub capacity: u64,
    pub bootable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineTemplate {
    pub href: Option<String>,
    pub machine_config: Option<Href>,
    pub machine_image: Option<Href>,
}

#[derive(Debug, Deserialize)]
pub struct Href {
    pub href: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineCreate {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub machine_template: MachineTemplate,
}

/// Full machine representation sent by PUT. Server-owned fields are ignored.
#[derive(Debug, Deserialize)]
pub struct MachineUpdate {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct VolumeCreate {
    pub name: String,
    pub capacity: u64,
    #[serde(default)]
    pub bootable: bool,
}

#[derive(Debug, Deserialize)]
pub struct Action {
    #[serde(rename = "resourceURI")]
    pub resource_uri: String,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct CollectionBody<T> {
    #[serde(rename = "resourceURI")]
    pub resource_uri: String,
    pub id: String,
    pub count: usize,
    #[serde(flatten)]
    pub members: BTreeMap<&'static str, Vec<T>>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub machines: BTreeMap<String, Machine>,
    pub volumes: BTreeMap<String, Volume>,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    db: Db,
    authorizations: Arc<Vec<String>>,
}

/// Router accepting the default `admin`/`secret` account.
pub fn app() -> Router {
    app_with_accounts(&[(DEFAULT_USERNAME, DEFAULT_PASSWORD)])
}

/// Router accepting HTTP Basic credentials for each `(username, password)`.
pub fn app_with_accounts(accounts: &[(&str, &str)]) -> Router {
    let authorizations = accounts
        .iter()
        .map(|(username, password)| {
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
            format!("Basic {encoded}")
        })
        .collect();
    let state = AppState {
        db: Db::default(),
        authorizations: Arc::new(authorizations),
    };

    Router::new()
        .route("/machines", get(list_machines).post(create_machine))
        .route(
            "/machines/{name}",
            get(get_machine).put(update_machine).delete(delete_machine),
        )
        .route("/machines/{name}/{action}", post(machine_action))
        .route("/volumes", get(list_volumes).post(create_volume))
        .route("/volumes/{name}", get(get_volume).delete(delete_volume))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_cimi))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Reject requests lacking the protocol version header or valid credentials.
async fn require_cimi(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let headers = request.headers();
    if headers
        .get("CIMI-Specification-Version")
        .and_then(|v| v.to_str().ok())
        != Some("1.0")
    {
        tracing::warn!(uri = %request.uri(), "missing CIMI-Specification-Version");
        return Err(StatusCode::BAD_REQUEST);
    }

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| state.authorizations.iter().any(|a| a == value));
    if !authorized {
        tracing::warn!(uri = %request.uri(), "rejected credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn collection<T>(kind: &str, key: &'static str, members: Vec<T>) -> CollectionBody<T> {
    CollectionBody {
        resource_uri: format!("{SCHEMA}/{kind}Collection"),
        id: format!("/{key}"),
        count: members.len(),
        members: BTreeMap::from([(key, members)]),
    }
}

async fn list_machines(State(state): State<AppState>) -> Json<CollectionBody<Machine>> {
    let store = state.db.read().await;
    Json(collection(
        "Machine",
        "machines",
        store.machines.values().cloned().collect(),
    ))
}

async fn create_machine(
    State(state): State<AppState>,
    Json(input): Json<MachineCreate>,
) -> Result<(StatusCode, Json<Machine>), StatusCode> {
    let template = &input.machine_template;
    if template.href.is_none() && template.machine_config.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut store = state.db.write().await;
    if store.machines.contains_key(&input.name) {
        return Err(StatusCode::CONFLICT);
    }
    let machine = Machine {
        resource_uri: format!("{SCHEMA}/Machine"),
        id: format!("/machines/{}", input.name),
        name: input.name,
        description: input.description,
        state: "STOPPED".to_string(),
        cpu: 1,
        memory: 1_048_576,
        properties: input.properties,
    };
    store.machines.insert(machine.name.clone(), machine.clone());
    Ok((StatusCode::CREATED, Json(machine)))
}

async fn get_machine(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Machine>, StatusCode> {
    let store = state.db.read().await;
    store
        .machines
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_machine(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(input): Json<MachineUpdate>,
) -> Result<Json<Machine>, StatusCode> {
    if input.name != name {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut store = state.db.write().await;
    let machine = store.machines.get_mut(&name).ok_or(StatusCode::NOT_FOUND)?;
    machine.description = input.description;
    machine.properties = input.properties;
    Ok(Json(machine.clone()))
}

async fn delete_machine(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> StatusCode {
    let mut store = state.db.write().await;
    match store.machines.remove(&name) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn machine_action(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, String)>,
    Json(input): Json<Action>,
) -> StatusCode {
    let next_state = match action.as_str() {
        "start" | "restart" => "STARTED",
        "stop" => "STOPPED",
        "pause" => "PAUSED",
        "suspend" => "SUSPENDED",
        _ => return StatusCode::BAD_REQUEST,
    };
    if input.resource_uri != format!("{SCHEMA}/Action")
        || input.action != format!("{SCHEMA}/action/{action}")
    {
        return StatusCode::BAD_REQUEST;
    }

    let mut store = state.db.write().await;
    match store.machines.get_mut(&name) {
        Some(machine) => {
            machine.state = next_state.to_string();
            StatusCode::ACCEPTED
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn list_volumes(State(state): State<AppState>) -> Json<CollectionBody<Volume>> {
    let store = state.db.read().await;
    Json(collection(
        "Volume",
        "volumes",
        store.volumes.values().cloned().collect(),
    ))
}

async fn create_volume(
    State(state): State<AppState>,
    Json(input): Json<VolumeCreate>,
) -> Result<(StatusCode, Json<Volume>), StatusCode> {
    let mut store = state.db.write().await;
    if store.volumes.contains_key(&input.name) {
        return Err(StatusCode::CONFLICT);
    }
    let volume = Volume {
        resource_uri: format!("{SCHEMA}/Volume"),
        id: format!("/volumes/{}", input.name),
        name: input.name,
        state: "AVAILABLE".to_string(),
        capacity: input.capacity,
        bootable: input.bootable,
    };
    store.volumes.insert(volume.name.clone(), volume.clone());
    Ok((StatusCode::CREATED, Json(volume)))
}

async fn get_volume(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Volume>, StatusCode> {
    let store = state.db.read().await;
    store
        .volumes
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_volume(State(state): State<AppState>, Path(name): Path<String>) -> StatusCode {
    let mut store = state.db.write().await;
    match store.volumes.remove(&name) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}
