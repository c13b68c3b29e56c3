use crate::{
    auth::{AppHooks, AuthConfig, auth_options},
    dbauth::DbAuthHandler,
    services::{Analytics, EmailSender, EmailWorkerConfig, OutboxMailer, spawn_outbox_worker},
    storage::{PgStore, SCHEMA},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Instrument, Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything the server needs besides the database.
pub struct ServerArgs {
    pub port: u16,
    pub dsn: String,
    pub apply_schema: bool,
    pub auth_config: AuthConfig,
    pub email_sender: Arc<dyn EmailSender>,
    pub email_config: EmailWorkerConfig,
    pub analytics: Arc<dyn Analytics>,
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(args: ServerArgs) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    if args.apply_schema {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .instrument(span)
            .await
            .context("Failed to apply schema")?;
        info!("Database schema applied");
    }

    let options = auth_options(&args.auth_config);
    let store = Arc::new(PgStore::new(pool.clone(), &options.auth_fields)?);
    let frontend_origin = frontend_origin(args.auth_config.base_url())?;

    let hooks = AppHooks::new(
        Arc::new(args.auth_config),
        store.clone(),
        Arc::new(OutboxMailer::new(pool.clone())),
        store.clone(),
        args.analytics,
    );
    let handler = Arc::new(DbAuthHandler::new(options, store, Arc::new(hooks))?);

    // Pending email_outbox rows are delivered in the background with retries.
    spawn_outbox_worker(pool.clone(), args.email_sender, args.email_config);

    let app = app(handler, frontend_origin).layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{}", args.port)).await?;

    info!("Listening on [::]:{}", args.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// The routed application with request id, tracing and CORS layers.
///
/// `/health` additionally needs a `PgPool` extension.
pub fn app(handler: Arc<DbAuthHandler>, frontend_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let (router, _openapi) = router().split_for_parts();
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(handler)),
    )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// `scheme://host[:port]` of the web app, for CORS.
///
/// # Errors
/// Returns an error if the URL has no host.
pub fn frontend_origin(base_url: &Url) -> Result<HeaderValue> {
    let host = base_url
        .host_str()
        .ok_or_else(|| anyhow!("Base URL must include a valid host: {base_url}"))?;
    let port = base_url
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", base_url.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
