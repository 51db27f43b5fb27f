use crate::config::{AuditStorage, Settings};
use crate::infrastructure::{Database, PostgresAuditLogStore, PostgresAuthenticator};
use crate::pipeline::audit_store::{AuditLogStore, InMemoryAuditLogStore};
use crate::pipeline::clock::SystemClock;
use crate::pipeline::headers::paths;
use crate::pipeline::{
    AuditLogger, BasicAuth, FanOutForwarder, HyperMirrorTransport, PipelineStack, Truncator,
};
use crate::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    database: Option<Database>,
    router: Router,
}

impl Application {
    #[instrument]
    pub async fn new() -> Result<Self> {
        let settings = Settings::new()?;
        Self::build(settings, Router::new()).await
    }

    /// Wrap `api` (plus the liveness route and JSON 404) in the pipeline
    #[instrument(skip(settings, api))]
    pub async fn build(settings: Settings, api: Router) -> Result<Self> {
        let needs_database = settings.auth.enabled
            || (settings.audit.enabled && settings.audit.storage == AuditStorage::Postgres);

        let database = if needs_database {
            Some(Database::connect(&settings.database, &settings.database_url()).await?)
        } else {
            None
        };

        let stack = Self::pipeline_stack(&settings, database.as_ref()).await?;
        let router = stack.apply_to_router(Self::routes(api));

        Ok(Self {
            settings,
            database,
            router,
        })
    }

    async fn pipeline_stack(settings: &Settings, database: Option<&Database>) -> Result<PipelineStack> {
        let max_request_size = settings.max_request_size()?;
        let mut stack = PipelineStack::new().with_request_timeout(settings.request_timeout());

        if settings.auth.enabled {
            if let Some(database) = database {
                let authenticator = Arc::new(PostgresAuthenticator::new(database.pool().clone()));
                stack = stack.with_auth(BasicAuth::new(settings.auth_config()?, authenticator));
            }
        }

        if settings.audit.enabled {
            let store: Arc<dyn AuditLogStore> = match (settings.audit.storage, database) {
                (AuditStorage::Postgres, Some(database)) => {
                    let store = PostgresAuditLogStore::new(database.pool().clone());
                    store.ensure_schema().await?;
                    Arc::new(store)
                }
                _ => Arc::new(InMemoryAuditLogStore::new()),
            };
            info!(storage = ?settings.audit.storage, "Audit logging enabled");
            stack = stack.with_audit(AuditLogger::new(
                store,
                Arc::new(SystemClock),
                max_request_size,
            ));
        }

        let mirror = settings.mirror_config()?;
        if !mirror.targets.is_empty() {
            info!(
                targets = ?mirror.targets.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Mirroring enabled"
            );
            stack = stack.with_mirror(FanOutForwarder::new(
                mirror,
                Arc::new(HyperMirrorTransport::new()),
                max_request_size,
            ));
        }

        if let Some(truncate) = settings.truncate.clone() {
            stack = stack.with_truncate(Truncator::new(truncate, max_request_size));
        }

        Ok(stack)
    }

    fn routes(api: Router) -> Router {
        api.route(paths::IS_ALIVE, get(is_alive)).fallback(not_found)
    }

    /// Serve on the configured address until Ctrl+C
    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.settings.bind_address()).await?;
        self.run_with_listener(listener).await
    }

    pub async fn run_with_listener(self, listener: TcpListener) -> Result<()> {
        info!(
            address = %listener.local_addr()?,
            environment = %self.settings.application.environment,
            "Starting caretimes pipeline"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn is_alive() -> impl IntoResponse {
    Json(json!({ "message": "Server is alive" }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Item not found" })))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
