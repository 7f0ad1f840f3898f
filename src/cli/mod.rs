//! Command-line front end: clap parsing into [`AppConfig`] and dispatch to
//! the reconciliation runs.

mod clap_parser;

pub use clap_parser::{
    Cli, Command, CrmArgs, FinessLabArgs, FormatOpt, HealthCenterArgs, LabArgs, OutputArgs,
    PharmacyArgs, SubstituteArgs,
};

use crate::config::AppConfig;
use crate::orchestrator::{
    run_finess_labs, run_health_centers, run_labs, run_pharmacies, run_substitutes,
};
use crate::util::envfile::write_env_template;
use anyhow::Result;

pub fn run(cli: &Cli) -> Result<()> {
    if let Command::EnvTemplate { path } = &cli.command {
        write_env_template(path)?;
        log::info!("Wrote {}", path.display());
        return Ok(());
    }
    let Some(cfg) = cli.command.to_app_config()? else {
        return Ok(());
    };
    dispatch(&cli.command, &cfg)
}

fn dispatch(command: &Command, cfg: &AppConfig) -> Result<()> {
    let written = match command {
        Command::Pharmacies(_) => run_pharmacies(cfg)?,
        Command::Labs(_) => run_labs(cfg)?,
        Command::HealthCenters(_) => run_health_centers(cfg)?,
        Command::FinessLabs(_) => run_finess_labs(cfg)?,
        Command::Substitutes(_) => run_substitutes(cfg)?,
        Command::EnvTemplate { .. } => Vec::new(),
    };
    for p in &written {
        log::debug!("wrote {}", p.display());
    }
    Ok(())
}
