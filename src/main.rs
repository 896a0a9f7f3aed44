use std::{process, sync::Arc, time::Duration};

use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use tzquery::{
    application::{
        error::AppError,
        query::{QueryService, parse_count, parse_list},
        repos::QueryDispatcher,
        resources,
    },
    cache::{CacheConfig, CacheConsumer, CacheTrigger, EventQueue, ResponseCache},
    config,
    infra::{
        error::InfraError,
        http::{self, AdminState, ApiState},
        memory::InMemoryDispatcher,
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckQuery(args) => run_check_query(&settings, &args),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let dispatcher: Arc<dyn QueryDispatcher> = match settings.data.fixtures.as_deref() {
        Some(path) => Arc::new(InMemoryDispatcher::load(path).await?),
        None => {
            info!("No fixtures configured, serving empty tables");
            Arc::new(InMemoryDispatcher::default())
        }
    };

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(ResponseCache::new(&cache_config));
    let queue = Arc::new(EventQueue::new());
    let consumer = Arc::new(CacheConsumer::new(
        cache_config.clone(),
        cache.clone(),
        queue.clone(),
    ));
    let trigger = Arc::new(CacheTrigger::new(cache_config.clone(), queue, consumer));

    let mut queries = QueryService::new(dispatcher, settings.query);
    if cache_config.enable {
        queries = queries.with_cache(cache, &cache_config);
    }

    // Picks up events published without `consume_now`.
    let consume_handle = cache_config.enable.then(|| {
        let consumer = trigger.consumer().clone();
        let interval_ms = cache_config.auto_consume_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.tick().await;
            loop {
                interval.tick().await;
                consumer.consume_all();
            }
        })
    });

    let api_state = ApiState {
        queries: Arc::new(queries),
    };
    let admin_state = AdminState {
        trigger,
        cache_enabled: cache_config.enable,
    };

    let result = serve_http(&settings, api_state, admin_state).await;

    if let Some(handle) = consume_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

/// Decode a query string the way the public API would and print its cache key.
fn run_check_query(
    settings: &config::Settings,
    args: &config::CheckQueryArgs,
) -> Result<(), AppError> {
    let schema = resources::by_name(&args.resource).ok_or_else(|| {
        let known: Vec<_> = resources::ALL.iter().map(|schema| schema.resource).collect();
        AppError::validation(format!(
            "unknown resource `{}` (expected one of: {})",
            args.resource,
            known.join(", ")
        ))
    })?;

    let raw = args.query.trim_start_matches('?');
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();

    let (key, unsatisfiable) = if args.count {
        let request = parse_count(schema, &pairs)?;
        (request.cache_key(), request.is_unsatisfiable())
    } else {
        let request = parse_list(schema, &pairs, &settings.query)?;
        (request.cache_key(), request.is_unsatisfiable())
    };

    println!("{key}");
    if unsatisfiable {
        println!("# matches no rows, answered without dispatch");
    }
    Ok(())
}

async fn serve_http(
    settings: &config::Settings,
    api_state: ApiState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_api_router(api_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listening"
    );

    let public_server = axum::serve(public_listener, public_router.into_make_service());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service());

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
