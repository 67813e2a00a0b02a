use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;

use aisle_finder::catalog::Catalog;
use aisle_finder::config::{Args, Config};
use aisle_finder::handlers::{self, UploadLimit};
use aisle_finder::service::PredictionService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    let config = Config::load(&args).context("invalid configuration")?;

    // Nothing is served unless both the catalog and the model load.
    let catalog = Catalog::load(&config.catalog_path).context("catalog unavailable")?;
    let classifier = config
        .classifier
        .build()
        .context("classifier unavailable")?;

    let service = web::Data::new(PredictionService::new(
        classifier,
        catalog,
        config.confidence_threshold,
    ));
    let limit = web::Data::new(UploadLimit(config.max_upload_bytes));

    log::info!(
        "Server running at http://{}:{} ({} classifier, threshold {})",
        config.host,
        config.port,
        service.classifier_kind(),
        service.threshold()
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(service.clone())
            .app_data(limit.clone())
            .configure(handlers::configure)
    })
    .bind(config.bind_addr())
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    Ok(())
}
