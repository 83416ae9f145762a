//! Inference sessions.
//!
//! A [`Session`] owns one engine, one variable scope, one prepared plan for
//! block 0 of the loaded program, and the program's feed/fetch target names.
//! Sessions are driven synchronously: [`Session::run`] feeds, executes and
//! fetches on the calling thread. For concurrent inference, give each thread
//! its own session via [`Session::try_clone`].

use std::time::Instant;
use tracing::{debug, error};

use crate::config::{SessionConfig, VariableStrategy};
use crate::engine::{Engine, FetchTargets, Place, Program};
use crate::error::{InferError, Result};
use crate::flags;
use crate::marshal;
use crate::tensor::{FlatTensor, NativeTensor};

/// Program block executed by every session.
const MAIN_BLOCK: usize = 0;

/// Result of a timed run.
#[derive(Debug)]
pub struct InferenceResult {
    /// Output tensors, one per fetch target.
    pub outputs: Vec<FlatTensor>,
    /// Wall-clock time of feed, execution and fetch in milliseconds.
    pub latency_ms: f64,
}

/// Inference session over an engine `E`.
///
/// # Example
///
/// ```ignore
/// use fluid_infer::{create_session, FlatTensor, NativeEngine, SessionConfig};
///
/// let config = SessionConfig::from_model_dir("models/word2vec");
/// let mut session = create_session::<NativeEngine>(config)?;
///
/// let words = FlatTensor::from_i64(vec![4, 1], &[12, 7, 431, 9]);
/// let outputs = session.run(&[words])?;
/// println!("{:?}", outputs[0].shape);
/// ```
pub struct Session<E: Engine> {
    config: SessionConfig,
    place: Place,
    strategy: VariableStrategy,
    feed_target_names: Vec<String>,
    fetch_target_names: Vec<String>,
    // Field order is drop order: the plan before the program it was
    // prepared from, and the engine last.
    plan: E::Plan,
    _program: E::Program,
    scope: E::Scope,
    engine: E,
}

/// Validate `config`, apply its global flags, and initialize a session.
pub fn create_session<E: Engine>(config: SessionConfig) -> Result<Session<E>> {
    debug!("create session");
    config.validate()?;
    let flags = config.global_flags();
    if !flags.is_empty() {
        flags::init_global_flags::<E>(&flags)?;
    }
    Session::init(config)
}

impl<E: Engine> Session<E> {
    /// Load the configured program and prepare it for execution.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no single program location is set,
    /// or a model load error when the engine cannot load it.
    pub fn init(config: SessionConfig) -> Result<Self> {
        debug!("session init");
        Self::load(config)
    }

    /// Create an independent session from the same configuration.
    ///
    /// The clone loads the program and parameters again into its own engine
    /// and scope; nothing mutable is shared, so both sessions may run on
    /// different threads at the same time.
    pub fn try_clone(&self) -> Result<Self> {
        debug!("session clone");
        Self::load(self.config.clone()).map_err(|e| {
            error!("failed to clone session: {}", e);
            e
        })
    }

    fn load(config: SessionConfig) -> Result<Self> {
        let source = config.program_source().map_err(|e| {
            error!("fail to load inference model: {}", e);
            e
        })?;
        let place = config.place();
        let strategy = config.variable_strategy();

        let engine = E::new(place)?;
        let mut scope = engine.new_scope()?;
        let program = engine.load_program(&mut scope, &source).map_err(|e| {
            error!("fail to load inference model from {:?}: {}", source, e);
            match e {
                InferError::ModelLoad(_) => e,
                other => InferError::model_load(other.to_string()),
            }
        })?;
        let plan = engine.prepare(&program, MAIN_BLOCK)?;

        if strategy == VariableStrategy::Shared {
            engine.create_variables(&program, &mut scope, MAIN_BLOCK)?;
        }

        let feed_target_names = program.feed_target_names();
        let fetch_target_names = program.fetch_target_names();
        ensure_unique("feed", &feed_target_names)?;
        ensure_unique("fetch", &fetch_target_names)?;
        debug!(
            "loaded program on {}: feeds {:?}, fetches {:?}",
            place, feed_target_names, fetch_target_names
        );

        Ok(Self {
            config,
            place,
            strategy,
            feed_target_names,
            fetch_target_names,
            plan,
            _program: program,
            scope,
            engine,
        })
    }

    /// Run one inference pass.
    ///
    /// `inputs` are matched to [`Session::feed_target_names`] by position.
    /// Returns one float32 tensor per fetch target, named after it.
    ///
    /// # Errors
    ///
    /// Fails without executing when the input count or an input type is
    /// wrong; fails after execution when an output cannot be converted.
    pub fn run(&mut self, inputs: &[FlatTensor]) -> Result<Vec<FlatTensor>> {
        self.run_timed(inputs).map(|result| result.outputs)
    }

    /// Like [`Session::run`], also reporting the elapsed time.
    pub fn run_timed(&mut self, inputs: &[FlatTensor]) -> Result<InferenceResult> {
        debug!("session run");
        let start = Instant::now();

        let feeds = marshal::to_native_feeds(inputs, &self.feed_target_names).map_err(|e| {
            error!("fail to set feed: {}", e);
            e
        })?;

        let mut fetches = FetchTargets::with_capacity(self.fetch_target_names.len());
        self.engine.run_prepared(
            &self.plan,
            &mut self.scope,
            &feeds,
            &mut fetches,
            self.strategy.creates_vars_per_run(),
        )?;

        let ordered = self.order_fetches(fetches)?;
        let mut outputs = marshal::from_native_fetches(&ordered).map_err(|e| {
            error!("fail to get fetches: {}", e);
            e
        })?;
        for (output, name) in outputs.iter_mut().zip(&self.fetch_target_names) {
            output.name = name.clone();
        }

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!("predict cost: {:.3}ms", latency_ms);
        Ok(InferenceResult {
            outputs,
            latency_ms,
        })
    }

    fn order_fetches(&self, mut fetches: FetchTargets) -> Result<Vec<NativeTensor>> {
        self.fetch_target_names
            .iter()
            .map(|name| {
                fetches.remove(name).ok_or_else(|| {
                    InferError::engine(format!(
                        "engine produced no tensor for fetch target '{}'",
                        name
                    ))
                })
            })
            .collect()
    }

    /// Input slot names in feed order.
    pub fn feed_target_names(&self) -> &[String] {
        &self.feed_target_names
    }

    /// Output slot names in fetch order.
    pub fn fetch_target_names(&self) -> &[String] {
        &self.fetch_target_names
    }

    /// Placement the engine is bound to.
    pub fn place(&self) -> Place {
        self.place
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn variable_strategy(&self) -> VariableStrategy {
        self.strategy
    }
}

fn ensure_unique(kind: &str, names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(InferError::model_load(format!(
                "program declares {} target '{}' more than once",
                kind, name
            )));
        }
    }
    Ok(())
}

/// Object-safe interface over sessions of any engine.
///
/// Lets callers hold `Box<dyn Predictor>` without naming the engine type.
pub trait Predictor: Send {
    /// Run one inference pass.
    fn run(&mut self, inputs: &[FlatTensor]) -> Result<Vec<FlatTensor>>;

    /// Create an independent predictor over the same program.
    fn clone_predictor(&self) -> Result<Box<dyn Predictor>>;

    fn feed_target_names(&self) -> &[String];

    fn fetch_target_names(&self) -> &[String];
}

impl<E: Engine + 'static> Predictor for Session<E> {
    fn run(&mut self, inputs: &[FlatTensor]) -> Result<Vec<FlatTensor>> {
        Session::run(self, inputs)
    }

    fn clone_predictor(&self) -> Result<Box<dyn Predictor>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn feed_target_names(&self) -> &[String] {
        &self.feed_target_names
    }

    fn fetch_target_names(&self) -> &[String] {
        &self.fetch_target_names
    }
}
