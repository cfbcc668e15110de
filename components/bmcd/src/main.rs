//! The final binary: loads the on-disk config, constructs every service,
//! wires them into one `Operator`, and runs until terminated (spec.md
//! §4.3, mirroring the teacher's `components/sup`'s `main`/`start` shape).

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bmc_gateway::Gateway;
use bmc_operator::{Operator, OperatorConfigBuilder};
use bmc_powermgr::PowerManager;
use bmc_sensormon::SensorMonitor;
use bmc_statemgr::StateManager;
use bmc_thermalmgr::ThermalManager;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "bmcd", about = "Baseboard management controller daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/bmcd/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let file_config = match config::load(&args.config).await {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load config from {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let operator_config = OperatorConfigBuilder::new(file_config.operator.service_name.clone())
        .data_dir(file_config.operator.data_dir.clone());
    let operator_config = match &file_config.operator.otlp_endpoint {
        Some(endpoint) => operator_config.otlp_endpoint(endpoint.clone()),
        None => operator_config,
    };

    let mut operator = match Operator::new(operator_config.build()) {
        Ok(operator) => operator,
        Err(err) => {
            eprintln!("failed to construct the operator: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(exit) = register_services(&mut operator, &file_config) {
        return exit;
    }

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            shutdown_cancel.cancel();
        }
    });

    match operator.run(cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "operator exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn register_services(operator: &mut Operator, file_config: &config::FileConfig) -> Result<(), ExitCode> {
    let bus = operator.bus();
    let shutdown_timeout = config::shutdown_timeout();

    let statemgr_config = config::statemgr_config(file_config).map_err(report_config_error)?;
    operator.add_service(Arc::new(StateManager::new(bus.clone(), statemgr_config)), shutdown_timeout);

    let powermgr_config = config::powermgr_config(file_config).map_err(report_config_error)?;
    operator.add_service(Arc::new(PowerManager::new(bus.clone(), powermgr_config)), shutdown_timeout);

    let sensormon_config = config::sensormon_config(file_config).map_err(report_config_error)?;
    operator.add_service(Arc::new(SensorMonitor::new(bus.clone(), sensormon_config)), shutdown_timeout);

    let thermalmgr_config = config::thermalmgr_config(file_config).map_err(report_config_error)?;
    operator.add_service(Arc::new(ThermalManager::new(bus.clone(), thermalmgr_config)), shutdown_timeout);

    let gateway_config = config::gateway_config(file_config).map_err(report_config_error)?;
    operator.add_service(Arc::new(Gateway::new(bus, gateway_config)), Duration::from_secs(15));

    Ok(())
}

fn report_config_error(err: config::ConfigError) -> ExitCode {
    eprintln!("invalid configuration: {err}");
    ExitCode::FAILURE
}
