use crate::controller::config;
use crate::controller::controller::Controller;
use crate::utils;

pub async fn run_controller() {
    let args = std::env::args().collect::<Vec<String>>();
    let path = args.get(1).cloned().unwrap_or_else(|| "controller.toml".to_string());

    if let Err(e) = utils::init_tracing() {
        eprintln!("Failed to initialize logging: {}", e);
        return;
    }

    let cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("cannot load {:?}: {:#}", path, e);
            std::process::exit(1);
        }
    };
    tracing::debug!("config: {:?}", cfg);

    let mut controller = match Controller::new(&cfg).await {
        Ok(controller) => controller,
        Err(e) => {
            tracing::error!("controller startup failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        tracing::error!("controller error: {}", e);
    }
}
