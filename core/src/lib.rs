//! fluid-infer: inference session facade over a pre-built computation graph.
//!
//! This crate sits in front of an external graph runtime. Callers hand it
//! flat tensors (shape, element type, raw bytes); a [`Session`] converts them
//! into the runtime's tensors, executes the loaded program once and converts
//! the outputs back. Variable-length outputs (one row group per input, as in
//! batched detection) are reassembled into a single zero-padded tensor.
//!
//! # Features
//!
//! - **native**: Link the engine bridge library and expose [`NativeEngine`]
//!   plus the `fluid-infer` binary
//! - **cuda**: Bridge built with accelerator support (implies `native`)
//!
//! # Example
//!
//! ```ignore
//! use fluid_infer::{create_session, FlatTensor, NativeEngine, SessionConfig};
//!
//! let config = SessionConfig::from_files("model/__model__", "model/__params__");
//! let mut session = create_session::<NativeEngine>(config)?;
//!
//! // A clone reloads the program and can be moved to another thread.
//! let worker = session.try_clone()?;
//!
//! let image = FlatTensor::from_f32(vec![1, 3, 300, 300], &vec![0.0; 3 * 300 * 300]);
//! let result = session.run_timed(&[image])?;
//! println!("{:?} in {:.2}ms", result.outputs[0].shape, result.latency_ms);
//! ```
//!
//! # Building
//!
//! The default build has no native dependencies. Enabling `native` requires
//! `libfluid_bridge` (see `build.rs`):
//!
//! ```bash
//! FLUID_BRIDGE_DIR=/opt/fluid/lib cargo build --release --features native
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod marshal;
pub mod session;
pub mod tensor;

// Re-export commonly used types
pub use config::{ProgramSource, SessionConfig, VariableStrategy};
#[cfg(feature = "native")]
pub use engine::NativeEngine;
pub use engine::{Engine, FeedTargets, FetchTargets, Place, Program};
pub use error::{InferError, Result};
pub use session::{create_session, InferenceResult, Predictor, Session};
pub use tensor::{DataType, FlatTensor, Lod, NativeBuffer, NativeTensor};
