//! External Collaborators
//!
//! The pipeline reads item fields through a [`PathResolver`] and renders
//! template mappings through an [`ExpressionEvaluator`]. Both are traits so a
//! host can plug in its own path syntax or template language; the defaults
//! here cover dotted paths and `{{ path }}` placeholders.

mod path;
mod template;

use std::fmt;
use std::rc::Rc;

pub use path::{DottedPathResolver, PathResolver};
pub use template::{ExpressionEvaluator, PlaceholderEvaluator};

/// The collaborators a pipeline calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Rc<dyn PathResolver>,
    pub evaluator: Rc<dyn ExpressionEvaluator>,
}

impl Collaborators {
    pub fn new(resolver: Rc<dyn PathResolver>, evaluator: Rc<dyn ExpressionEvaluator>) -> Self {
        Self {
            resolver,
            evaluator,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            resolver: Rc::new(DottedPathResolver),
            evaluator: Rc::new(PlaceholderEvaluator::new()),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
