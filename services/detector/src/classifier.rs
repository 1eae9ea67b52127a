//! Explicit content decision.
//!
//! An image is explicit when any safe-search category is rated at or above
//! [`EXPLICIT_THRESHOLD`]. A single category is enough.

use imgguard_pipeline::{
    Category, HandlerError, ImageAnnotator, Likelihood, LikelihoodVector, ObjectRef,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Lowest rating that flags a category
pub const EXPLICIT_THRESHOLD: Likelihood = Likelihood::Likely;

/// Outcome of classifying one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub explicit: bool,
    /// Categories at or above the threshold
    pub flagged: Vec<Category>,
}

impl Verdict {
    pub fn from_likelihoods(ratings: &LikelihoodVector) -> Self {
        let flagged: Vec<Category> = ratings
            .categories()
            .into_iter()
            .filter(|(_, likelihood)| *likelihood >= EXPLICIT_THRESHOLD)
            .map(|(category, _)| category)
            .collect();

        Self {
            explicit: !flagged.is_empty(),
            flagged,
        }
    }
}

/// Resolves an object to a verdict through the annotation service
pub struct ContentClassifier {
    annotator: Arc<dyn ImageAnnotator>,
}

impl ContentClassifier {
    pub fn new(annotator: Arc<dyn ImageAnnotator>) -> Self {
        Self { annotator }
    }

    /// One remote safe-search call per invocation, no caching
    #[instrument(skip(self, object), fields(object = %object))]
    pub async fn classify(&self, object: &ObjectRef) -> Result<Verdict, HandlerError> {
        let ratings = self
            .annotator
            .safe_search(&object.uri())
            .await
            .map_err(|e| HandlerError::ClassificationUnavailable(e.to_string()))?;

        let verdict = Verdict::from_likelihoods(&ratings);
        debug!(explicit = verdict.explicit, flagged = ?verdict.flagged, "Classification complete");

        Ok(verdict)
    }
}
