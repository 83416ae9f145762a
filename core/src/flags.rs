//! Process-wide engine flags.
//!
//! Engines read some settings (such as the device memory fraction) from
//! global flags that must be set once, before the first session exists.
//! [`init_global_flags`] records the first flag set and forwards it to the
//! engine; repeating the same set is accepted, a different one is refused.

use std::sync::Mutex;
use tracing::{debug, error};

use crate::engine::Engine;
use crate::error::{InferError, Result};

static GLOBAL_FLAGS: Mutex<Option<Vec<String>>> = Mutex::new(None);

/// Split a `--key=value` flag into its key and value.
pub fn parse_flag(flag: &str) -> Result<(&str, &str)> {
    let body = flag
        .strip_prefix("--")
        .ok_or_else(|| InferError::config(format!("flag must start with '--': {}", flag)))?;
    match body.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(InferError::config(format!(
            "flag must have the form --key=value: {}",
            flag
        ))),
    }
}

/// Initialize the engine's global flags once per process.
///
/// # Errors
///
/// Returns a configuration error for malformed flags, whatever the engine
/// reports, or [`InferError::FlagConflict`] if flags were already set to a
/// different list.
pub fn init_global_flags<E: Engine>(flags: &[String]) -> Result<()> {
    for flag in flags {
        parse_flag(flag)?;
    }

    let mut state = GLOBAL_FLAGS.lock().unwrap_or_else(|e| e.into_inner());
    match state.as_ref() {
        Some(existing) if existing.as_slice() == flags => {
            debug!("global flags already set: {:?}", existing);
            Ok(())
        }
        Some(existing) => {
            error!(
                "global flags already set to {:?}, refusing {:?}",
                existing, flags
            );
            Err(InferError::FlagConflict {
                existing: existing.clone(),
                requested: flags.to_vec(),
            })
        }
        None => {
            E::init_global_flags(flags)?;
            for flag in flags {
                debug!("set flag: {}", flag);
            }
            *state = Some(flags.to_vec());
            Ok(())
        }
    }
}

/// Flags recorded by the first successful [`init_global_flags`], if any.
pub fn global_flags() -> Option<Vec<String>> {
    GLOBAL_FLAGS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}
