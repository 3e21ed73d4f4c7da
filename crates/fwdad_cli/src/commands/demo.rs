//! Demo command for nested dual levels.
//!
//! Walks through two nested levels and shows that the inner dual is
//! forgotten once its level exits while the outer one survives.
//!
//! # Expected Output
//!
//! ```text
//! [Demo] enter_level -> 0
//! [Demo] make_dual(x, dx) at level 0
//! [Demo] enter_level -> 1
//! [Demo] make_dual(y, dy) at level 1
//! [Demo] exit_level(1)
//! [Demo] unpack y-dual at level 1 -> tangent: none
//! [Demo] unpack x-dual at level 0 -> tangent: [0.1, 0.2, 0.3]
//! [Demo] exit_level(0), current level: -1
//! ```

use fwdad_core::config::ForwardAdConfig;
use fwdad_core::{ForwardAdSession, HostEngine, Level, TensorId};

use crate::Result;

/// Runs the nested-level walkthrough.
pub fn run(config: &ForwardAdConfig) -> Result<()> {
    println!("========================================");
    println!("Forward AD Dual Level Demo");
    println!("========================================");
    println!();

    let mut session = ForwardAdSession::with_config(HostEngine::new(), config.clone())?;
    let x = session.engine_mut().vector(vec![1.0, 2.0, 3.0]);
    let dx = session.engine_mut().vector(vec![0.1, 0.2, 0.3]);
    let y = session.engine_mut().vector(vec![4.0, 5.0, 6.0]);
    let dy = session.engine_mut().vector(vec![1.0, 1.0, 1.0]);

    let l0 = session.enter_level()?;
    println!("[Demo] enter_level -> {}", l0);
    let dual_x = session.make_dual(x, dx, None)?;
    println!("[Demo] make_dual(x, dx) at level {}", dual_x.level());

    let l1 = session.enter_level()?;
    println!("[Demo] enter_level -> {}", l1);
    let dual_y = session.make_dual(y, dy, None)?;
    println!("[Demo] make_dual(y, dy) at level {}", dual_y.level());

    session.exit_level(Some(l1))?;
    println!("[Demo] exit_level({})", l1);

    let inner = tangent_text(&mut session, dual_y.handle(), l1)?;
    println!("[Demo] unpack y-dual at level {} -> tangent: {}", l1, inner);
    let outer = tangent_text(&mut session, dual_x.handle(), l0)?;
    println!("[Demo] unpack x-dual at level {} -> tangent: {}", l0, outer);

    session.exit_level(None)?;
    println!(
        "[Demo] exit_level({}), current level: {}",
        l0,
        session.current_level_raw()
    );

    println!();
    println!("Registry entries left: {}", session.registry().len());
    Ok(())
}

fn tangent_text(
    session: &mut ForwardAdSession<HostEngine>,
    tensor: TensorId,
    level: Level,
) -> Result<String> {
    let (_, tangent) = session.unpack_dual(tensor, Some(level))?;
    Ok(match tangent {
        Some(t) => format!("{:?}", session.engine().values(t)?),
        None => "none".to_string(),
    })
}
