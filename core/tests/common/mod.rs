//! In-process mock engine for session tests.
//!
//! The program is picked from the last path component of the program
//! source, so tests select behavior through the config alone:
//!
//! - `affine*`: feed `x` (float32), fetch `y = x * weight` and `runs`, the
//!   number of runs recorded in the scope's variables
//! - `detector*`: feed `counts` (int64, rows per example), fetch `boxes`
//!   (float32, 6 values per row) with a one-level LoD
//! - `labels*`: feed `x`, fetch `labels` as int64
//! - `nested*`: fetch `boxes` with a two-level LoD
//! - `duplicate*`: declares the feed target `x` twice
//! - `missing*`: fails to load
//!
//! Directory sources load `weight = 1.0`, combined sources `weight = 2.0`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use fluid_infer::{
    Engine, FeedTargets, FetchTargets, InferError, NativeBuffer, NativeTensor, Place, Program,
    ProgramSource, Result,
};

static LOADS: Mutex<Option<HashMap<String, usize>>> = Mutex::new(None);
static FLAG_CALLS: Mutex<Vec<Vec<String>>> = Mutex::new(Vec::new());

/// Number of times a program with this name was loaded.
pub fn load_count(name: &str) -> usize {
    LOADS
        .lock()
        .unwrap()
        .as_ref()
        .and_then(|m| m.get(name).copied())
        .unwrap_or(0)
}

/// Flag lists the engine received, in call order.
pub fn flag_calls() -> Vec<Vec<String>> {
    FLAG_CALLS.lock().unwrap().clone()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Affine,
    Detector,
    Labels,
    Nested,
}

pub struct MockProgram {
    name: String,
    kind: Kind,
    feeds: Vec<String>,
    fetches: Vec<String>,
}

impl Program for MockProgram {
    fn feed_target_names(&self) -> Vec<String> {
        self.feeds.clone()
    }

    fn fetch_target_names(&self) -> Vec<String> {
        self.fetches.clone()
    }
}

#[derive(Default)]
pub struct MockScope {
    weight: f32,
    vars_created: bool,
    runs: usize,
}

pub struct MockPlan {
    kind: Kind,
    block: usize,
}

pub struct MockEngine {
    place: Place,
}

impl MockEngine {
    pub fn place(&self) -> Place {
        self.place
    }
}

fn names(n: &[&str]) -> Vec<String> {
    n.iter().map(|s| s.to_string()).collect()
}

fn program_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn feed<'a>(feeds: &'a FeedTargets, name: &str) -> Result<&'a NativeTensor> {
    feeds
        .get(name)
        .ok_or_else(|| InferError::engine(format!("missing feed '{}'", name)))
}

impl Engine for MockEngine {
    type Scope = MockScope;
    type Program = MockProgram;
    type Plan = MockPlan;

    fn init_global_flags(flags: &[String]) -> Result<()> {
        FLAG_CALLS.lock().unwrap().push(flags.to_vec());
        Ok(())
    }

    fn new(place: Place) -> Result<Self> {
        Ok(Self { place })
    }

    fn new_scope(&self) -> Result<MockScope> {
        Ok(MockScope::default())
    }

    fn load_program(&self, scope: &mut MockScope, source: &ProgramSource) -> Result<MockProgram> {
        let (name, weight) = match source {
            ProgramSource::Directory(dir) => (program_name(dir), 1.0),
            ProgramSource::Combined { program, .. } => (program_name(program), 2.0),
        };

        let (kind, feeds, fetches) = if name.starts_with("affine") {
            (Kind::Affine, names(&["x"]), names(&["y", "runs"]))
        } else if name.starts_with("detector") {
            (Kind::Detector, names(&["counts"]), names(&["boxes"]))
        } else if name.starts_with("labels") {
            (Kind::Labels, names(&["x"]), names(&["labels"]))
        } else if name.starts_with("nested") {
            (Kind::Nested, names(&["x"]), names(&["boxes"]))
        } else if name.starts_with("duplicate") {
            (Kind::Affine, names(&["x", "x"]), names(&["y"]))
        } else {
            return Err(InferError::model_load(format!("no program at '{}'", name)));
        };

        *LOADS
            .lock()
            .unwrap()
            .get_or_insert_with(HashMap::new)
            .entry(name.clone())
            .or_insert(0) += 1;

        scope.weight = weight;
        Ok(MockProgram {
            name,
            kind,
            feeds,
            fetches,
        })
    }

    fn prepare(&self, program: &MockProgram, block: usize) -> Result<MockPlan> {
        assert!(!program.name.is_empty());
        Ok(MockPlan {
            kind: program.kind,
            block,
        })
    }

    fn create_variables(
        &self,
        _program: &MockProgram,
        scope: &mut MockScope,
        block: usize,
    ) -> Result<()> {
        assert_eq!(block, 0);
        scope.vars_created = true;
        Ok(())
    }

    fn run_prepared(
        &self,
        plan: &MockPlan,
        scope: &mut MockScope,
        feeds: &FeedTargets,
        fetches: &mut FetchTargets,
        create_vars: bool,
    ) -> Result<()> {
        assert_eq!(plan.block, 0);
        if create_vars {
            scope.runs = 0;
        } else if !scope.vars_created {
            return Err(InferError::engine("variables were never created"));
        }
        scope.runs += 1;

        match plan.kind {
            Kind::Affine => {
                let x = feed(feeds, "x")?;
                let values = match &x.buffer {
                    NativeBuffer::F32(v) => v.iter().map(|&v| v * scope.weight).collect(),
                    _ => return Err(InferError::engine("x must be float32")),
                };
                fetches.insert("y".into(), NativeTensor::from_f32(x.dims.clone(), values));
                fetches.insert(
                    "runs".into(),
                    NativeTensor::from_f32(vec![1], vec![scope.runs as f32]),
                );
            }
            Kind::Detector => {
                let counts = match &feed(feeds, "counts")?.buffer {
                    NativeBuffer::I64(v) => v.clone(),
                    _ => return Err(InferError::engine("counts must be int64")),
                };
                let mut offsets = vec![0usize];
                for &c in &counts {
                    offsets.push(offsets[offsets.len() - 1] + c as usize);
                }
                let rows = offsets[offsets.len() - 1];
                let data = (0..rows * 6).map(|v| v as f32 + 1.0).collect();
                fetches.insert(
                    "boxes".into(),
                    NativeTensor::from_f32(vec![rows, 6], data).with_lod(vec![offsets]),
                );
            }
            Kind::Labels => {
                let x = feed(feeds, "x")?;
                fetches.insert(
                    "labels".into(),
                    NativeTensor::from_i64(vec![x.numel()], vec![1; x.numel()]),
                );
            }
            Kind::Nested => {
                fetches.insert(
                    "boxes".into(),
                    NativeTensor::from_f32(vec![3, 1], vec![1.0, 2.0, 3.0])
                        .with_lod(vec![vec![0, 2], vec![0, 1, 3]]),
                );
            }
        }
        Ok(())
    }
}
