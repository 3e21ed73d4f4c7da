//! # fwdad_core: Forward-Mode AD Level Bookkeeping
//!
//! ## Role
//!
//! fwdad_core tracks nested forward-AD "dual levels" and the tangents attached
//! to tensors at each level. The numerics live in an external compute engine
//! reached through the [`engine::ComputeEngine`] trait; this crate provides:
//! - Level identifiers and error types (`types`)
//! - The compute engine boundary and a host reference engine (`engine`)
//! - The level stack, dual tensor registry and session façade (`session`)
//! - Layered configuration: defaults, TOML file, environment (`config`)
//!
//! ## Ownership Model
//!
//! There is no process-wide level counter. A [`session::ForwardAdSession`]
//! owns its level stack, registry and engine, and is threaded through call
//! sites by `&mut`. Use [`session::SharedForwardAdSession`] when one instance
//! has to be reached from several threads.
//!
//! ## Usage Examples
//!
//! ```rust
//! use fwdad_core::engine::HostEngine;
//! use fwdad_core::session::ForwardAdSession;
//!
//! let mut session = ForwardAdSession::new(HostEngine::new());
//! let x = session.engine_mut().vector(vec![1.0, 2.0]);
//! let dx = session.engine_mut().vector(vec![1.0, 0.0]);
//!
//! session
//!     .with_dual_level(|session, _level| {
//!         let dual = session.make_dual(x, dx, None)?;
//!         let (primal, tangent) = session.unpack_dual(dual.handle(), None)?;
//!         assert_eq!(primal, x);
//!         assert_eq!(tangent, Some(dx));
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(session.current_level(), None);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod config;
pub mod engine;
pub mod session;
pub mod types;

pub use config::ForwardAdConfig;
pub use engine::{ComputeEngine, HostEngine, TensorId};
pub use session::{DualLevelGuard, ForwardAdSession, SharedForwardAdSession};
pub use types::{DualTensor, EngineError, ErrorKind, ForwardAdError, Level};
