//! Thread-safe accumulation of a `CodeGeneratorResponse`.

use crate::error::{Error, ResponseError, ResponseIssue, Warning};
use crate::validate::{ValidationMode, normalize_response};
use parking_lot::Mutex;
use protoplug_protocol::{CodeGeneratorResponse, Edition, Features, File, normalize_path};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Callback receiving non-fatal response issues.
///
/// Called after the writer's lock is released, so it may use the writer.
pub type WarningHandler = Arc<dyn Fn(&Warning) + Send + Sync>;

/// Collects generated files, an error message, and supported features.
///
/// Clones share the same response. Every method may be called from any
/// thread until [`ResponseWriter::finalize`], after which all of them fail
/// with [`Error::AlreadyFinalized`].
#[derive(Clone)]
pub struct ResponseWriter {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    mode: ValidationMode,
    on_warning: WarningHandler,
}

#[derive(Default)]
struct State {
    names: HashSet<String>,
    files: Vec<File>,
    error_message: Option<String>,
    features: Features,
    minimum_edition: i32,
    maximum_edition: i32,
    finalized: bool,
}

impl ResponseWriter {
    pub fn new(mode: ValidationMode, on_warning: WarningHandler) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                mode,
                on_warning,
            }),
        }
    }

    /// Add a generated file.
    pub fn add_file(&self, name: impl Into<String>, content: impl Into<String>) -> Result<(), Error> {
        self.add_code_generator_response_files([File::new(name, content)])
    }

    /// Add raw file records.
    ///
    /// Unnormalized names are rewritten and a later record with an
    /// already-added name is dropped; both produce a warning regardless of
    /// the validation mode. Empty or invalid names are errors.
    pub fn add_code_generator_response_files(
        &self,
        files: impl IntoIterator<Item = File>,
    ) -> Result<(), Error> {
        let mut warnings = Vec::new();
        let result = self.with_state(|state| {
            for mut file in files {
                let name = file.name().to_string();
                if name.is_empty() {
                    return Err(ResponseError::EmptyFileName.into());
                }
                let normalized = normalize_path(&name).map_err(ResponseError::InvalidPath)?;
                if normalized != name {
                    warnings.push(Warning::new(ResponseIssue::UnnormalizedFileName {
                        name,
                        normalized: normalized.clone(),
                    }));
                    file.name = Some(normalized.clone());
                }
                if file.insertion_point().is_empty() && state.names.contains(&normalized) {
                    warnings.push(Warning::new(ResponseIssue::DuplicateFileName {
                        name: normalized,
                    }));
                    continue;
                }
                tracing::trace!(name = %normalized, "Adding generated file");
                state.names.insert(normalized);
                state.files.push(file);
            }
            Ok(())
        });
        self.emit(&warnings);
        result
    }

    /// Report that the input files cannot be processed by this plugin.
    ///
    /// An empty message is ignored. Later calls replace earlier ones.
    pub fn set_error(&self, message: impl Into<String>) -> Result<(), Error> {
        let message = message.into();
        self.with_state(|state| {
            if !message.is_empty() {
                state.error_message = Some(message);
            }
            Ok(())
        })
    }

    /// Replace the supported feature bits. Unknown bits are rejected.
    pub fn set_supported_features(&self, features: u64) -> Result<(), Error> {
        let features = Features::from_known_bits(features).map_err(ResponseError::from)?;
        self.with_state(|state| {
            state.features = features;
            Ok(())
        })
    }

    /// Add to the supported feature bits. Unknown bits are rejected.
    pub fn add_supported_features(&self, features: u64) -> Result<(), Error> {
        let features = Features::from_known_bits(features).map_err(ResponseError::from)?;
        self.with_state(|state| {
            state.features |= features;
            Ok(())
        })
    }

    /// Declare support for proto3 `optional` fields.
    pub fn set_feature_proto3_optional(&self) -> Result<(), Error> {
        self.add_supported_features(Features::PROTO3_OPTIONAL.bits())
    }

    /// Declare support for editions in `minimum..=maximum`.
    pub fn set_feature_supports_editions(
        &self,
        minimum: Edition,
        maximum: Edition,
    ) -> Result<(), Error> {
        self.with_state(|state| {
            state.features |= Features::SUPPORTS_EDITIONS;
            state.minimum_edition = minimum as i32;
            state.maximum_edition = maximum as i32;
            Ok(())
        })
    }

    pub fn set_minimum_edition(&self, edition: i32) -> Result<(), Error> {
        self.with_state(|state| {
            state.minimum_edition = edition;
            Ok(())
        })
    }

    pub fn set_maximum_edition(&self, edition: i32) -> Result<(), Error> {
        self.with_state(|state| {
            state.maximum_edition = edition;
            Ok(())
        })
    }

    /// Build and validate the response. Succeeds at most once.
    pub fn finalize(&self) -> Result<CodeGeneratorResponse, Error> {
        let warnings = RefCell::new(Vec::new());
        let result = self.with_state(|state| {
            state.finalized = true;
            let response = CodeGeneratorResponse {
                error: state.error_message.take(),
                supported_features: (!state.features.is_empty()).then_some(state.features.bits()),
                minimum_edition: (state.minimum_edition != 0).then_some(state.minimum_edition),
                maximum_edition: (state.maximum_edition != 0).then_some(state.maximum_edition),
                file: std::mem::take(&mut state.files),
            };
            let collect = |warning: &Warning| warnings.borrow_mut().push(warning.clone());
            Ok(normalize_response(response, self.shared.mode, &collect)?)
        });
        self.emit(&warnings.into_inner());
        result
    }

    fn emit(&self, warnings: &[Warning]) {
        for warning in warnings {
            (self.shared.on_warning)(warning);
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> Result<T, Error>) -> Result<T, Error> {
        let mut state = self.shared.state.lock();
        if state.finalized {
            return Err(Error::AlreadyFinalized);
        }
        f(&mut state)
    }
}

impl Default for ResponseWriter {
    /// Strict validation; warnings go to the `tracing` subscriber.
    fn default() -> Self {
        Self::new(
            ValidationMode::Strict,
            Arc::new(|warning: &Warning| tracing::warn!("{warning}")),
        )
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("mode", &self.shared.mode)
            .finish_non_exhaustive()
    }
}
