//! JVP command implementation
//!
//! Computes f(x) = x·x + sin(x) and its directional derivative along `dx` by
//! pushing a dual tensor through the host engine.

use fwdad_core::config::ForwardAdConfig;
use fwdad_core::{ForwardAdError, ForwardAdSession, HostEngine};
use serde::Serialize;
use tracing::debug;

use crate::{CliError, Result};

/// Primal values and tangents of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JvpOutput {
    /// Inputs
    pub x: Vec<f64>,
    /// Tangent direction
    pub dx: Vec<f64>,
    /// f(x)
    pub value: Vec<f64>,
    /// J(x) · dx
    pub tangent: Vec<f64>,
}

/// Run the jvp command
pub fn run(config: &ForwardAdConfig, x: &[f64], dx: &[f64], json: bool) -> Result<()> {
    let output = evaluate(config, x, dx)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("┌────────────┬────────────┬──────────────┬──────────────┐");
    println!("│ x          │ dx         │ f(x)         │ df           │");
    println!("├────────────┼────────────┼──────────────┼──────────────┤");
    for i in 0..output.x.len() {
        println!(
            "│ {:>10.4} │ {:>10.4} │ {:>12.6} │ {:>12.6} │",
            output.x[i], output.dx[i], output.value[i], output.tangent[i]
        );
    }
    println!("└────────────┴────────────┴──────────────┴──────────────┘");
    Ok(())
}

/// Evaluates f and its tangent inside one dual level.
pub fn evaluate(config: &ForwardAdConfig, x: &[f64], dx: &[f64]) -> Result<JvpOutput> {
    if x.is_empty() {
        return Err(CliError::InvalidArgument("--x must not be empty".to_string()));
    }
    if x.len() != dx.len() {
        return Err(CliError::InvalidArgument(format!(
            "--x has {} values but --dx has {}",
            x.len(),
            dx.len()
        )));
    }

    let mut session = ForwardAdSession::with_config(HostEngine::new(), config.clone())?;
    let primal = session.engine_mut().vector(x.to_vec());
    let direction = session.engine_mut().vector(dx.to_vec());

    let (value, tangent) = session.with_dual_level(|s, level| {
        let dual = s.make_dual(primal, direction, Some(level))?;
        debug!(level = level.index(), handle = %dual.handle(), "input dual created");

        let engine = s.engine_mut();
        let square = engine.mul(dual.handle(), dual.handle())?;
        let sine = engine.sin(dual.handle())?;
        let f = engine.add(square, sine)?;

        let (value, tangent) = s.unpack_dual(f, None)?;
        let tangent = tangent.ok_or_else(|| {
            ForwardAdError::InvalidArgument("result carries no tangent at the active level".to_string())
        })?;
        Ok((
            s.engine().values(value)?.to_vec(),
            s.engine().values(tangent)?.to_vec(),
        ))
    })?;

    Ok(JvpOutput {
        x: x.to_vec(),
        dx: dx.to_vec(),
        value,
        tangent,
    })
}
