//! Model sources.
//!
//! The renderer does not parse asset files. It asks a [`ModelSource`] for a
//! [`Model`] once, during initialization.

use crate::error::ResourceResult;
use crate::model::Model;

/// Supplies the model drawn by the renderer.
pub trait ModelSource: Send {
    /// Loads the model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be produced.
    fn load_model(&self) -> ResourceResult<Model>;
}

impl ModelSource for Model {
    fn load_model(&self) -> ResourceResult<Model> {
        Ok(self.clone())
    }
}

impl<F> ModelSource for F
where
    F: Fn() -> ResourceResult<Model> + Send,
{
    fn load_model(&self) -> ResourceResult<Model> {
        self()
    }
}
