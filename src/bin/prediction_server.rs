use std::{net::SocketAddr, sync::Arc};

use power_prediction::{
    init_logging, log_app_bind, log_app_start, log_model_selected, prediction_router,
    LoggingConfig, ModelRegistry, PredictionService, ProjectConfig, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = LoggingConfig::from_env();
    init_logging(&logging_cfg)?;
    log_app_start("prediction_server", &logging_cfg);

    let project = ProjectConfig::from_env();
    let server = ServerConfig::from_env()?;
    let addr: SocketAddr = server.bind_addr.parse()?;

    let model = {
        let registry = ModelRegistry::open(&project.registry_dir)?;
        let model = registry.load(&server.model_name, server.model_version)?;
        log_model_selected(
            &server.model_name,
            server.model_version,
            &registry.root().display().to_string(),
        );
        model
    };

    let service = PredictionService::new(Arc::new(model), server.model_name, server.model_version);
    let app = prediction_router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
