use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use ic_api_types::{CounterView, ErrorResponse, WalletConnectResponse};
use ic_chain_client::{ClientError, ClientResult};
use ic_contract_client::ContractClient;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::warn;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

const BUSY: &str = "another counter operation is in flight";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
type ViewResult = Result<Json<CounterView>, (StatusCode, Json<CounterView>)>;

/// The client lock is the single-writer guard: while it is held an
/// operation is in flight and readers get the last rendered view.
#[derive(Clone)]
pub struct AppState {
    client: Arc<Mutex<ContractClient>>,
    last_view: Arc<StdMutex<CounterView>>,
}

impl AppState {
    pub fn new(client: ContractClient) -> Self {
        let view = render(&client, None);
        Self {
            client: Arc::new(Mutex::new(client)),
            last_view: Arc::new(StdMutex::new(view)),
        }
    }

    pub async fn shutdown(&self) {
        self.client.lock().await.shutdown().await;
    }

    fn busy_view(&self) -> CounterView {
        let mut view = self.last_view.lock().unwrap_or_else(|p| p.into_inner()).clone();
        view.in_flight = true;
        view
    }

    fn remember(&self, view: &CounterView) {
        *self.last_view.lock().unwrap_or_else(|p| p.into_inner()) = view.clone();
    }

    fn respond(&self, client: &ContractClient, result: ClientResult<()>) -> ViewResult {
        match result {
            Ok(()) => {
                let view = render(client, None);
                self.remember(&view);
                Ok(Json(view))
            }
            Err(err) => {
                warn!("counter operation failed: {}", err);
                let view = render(client, Some(err.to_string()));
                self.remember(&view);
                Err((status_for(&err), Json(view)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Increment,
    Decrement,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/counter", get(counter))
        .route("/counter/initialize", post(initialize))
        .route("/counter/increment", post(increment))
        .route("/counter/decrement", post(decrement))
        .route("/wallet/connect", post(wallet_connect))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "counter-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "counter-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn counter(State(state): State<AppState>) -> ViewResult {
    let Ok(mut client) = state.client.try_lock() else {
        return Ok(Json(state.busy_view()));
    };

    let result = client.query().await.map(|_| ());
    state.respond(&client, result)
}

async fn initialize(State(state): State<AppState>) -> ViewResult {
    let Ok(mut client) = state.client.try_lock() else {
        return Err(busy(&state));
    };

    client.initialize().await;
    let result = client.query().await.map(|_| ());
    state.respond(&client, result)
}

async fn increment(State(state): State<AppState>) -> ViewResult {
    mutate(state, Mutation::Increment).await
}

async fn decrement(State(state): State<AppState>) -> ViewResult {
    mutate(state, Mutation::Decrement).await
}

// The lock stays held through the settlement wait so readers see
// `in_flight` until the refreshed value is in.
async fn mutate(state: AppState, mutation: Mutation) -> ViewResult {
    let Ok(mut client) = state.client.try_lock() else {
        return Err(busy(&state));
    };

    let outcome = match mutation {
        Mutation::Increment => client.increment().await,
        Mutation::Decrement => client.decrement().await,
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => return state.respond(&client, Err(err)),
    };

    // Acknowledged is success; a failed refresh only leaves the view stale.
    let refreshed = client.refresh_after_settlement(&outcome).await;
    let mut view = render(&client, None);
    if let Err(err) = refreshed {
        warn!("refresh after {} failed: {}", outcome.selector.name(), err);
        let tx = outcome
            .ack
            .as_ref()
            .map(|ack| format!(" ({})", ack.tx_hash))
            .unwrap_or_default();
        view.error = Some(format!(
            "{} acknowledged{tx}; refreshing the value failed: {err}",
            outcome.selector.name()
        ));
    }
    state.remember(&view);
    Ok(Json(view))
}

async fn wallet_connect(State(state): State<AppState>) -> ApiResult<WalletConnectResponse> {
    let Ok(mut client) = state.client.try_lock() else {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: BUSY.to_owned(),
            }),
        ));
    };
    let session = client.connect_wallet().await.map_err(client_error)?;
    state.remember(&render(&client, None));

    Ok(Json(WalletConnectResponse {
        account: session.account.address.to_string(),
        provider: session.account.provider_name().to_owned(),
        app_identity: session.identity.0,
    }))
}

fn render(client: &ContractClient, error: Option<String>) -> CounterView {
    let snapshot = client.snapshot();
    CounterView {
        value: snapshot.map(|s| s.value),
        source: snapshot.map(|s| s.source),
        mode: client.mode(),
        error,
        in_flight: false,
        account: client.account().map(|a| a.address.to_string()),
    }
}

fn busy(state: &AppState) -> (StatusCode, Json<CounterView>) {
    let mut view = state.busy_view();
    view.error = Some(BUSY.to_owned());
    (StatusCode::CONFLICT, Json(view))
}

fn status_for(err: &ClientError) -> StatusCode {
    match err {
        ClientError::SignerUnavailable(_) | ClientError::NoSignerInstalled => StatusCode::CONFLICT,
        ClientError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
        ClientError::TransactionRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClientError::Transport(_) | ClientError::Decode(_) => StatusCode::BAD_GATEWAY,
        ClientError::NoEndpointAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn client_error(err: ClientError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status_for(&err),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
