use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{FilterError, Result},
    filters::{
        Brightness, Contrast, Filter, FilterParams, FilterSpec, Grayscale, Invert, Saturate, Sepia, VhsFilter,
    },
    video::types::Frame,
};

type FilterFactory = Box<dyn Fn() -> Box<dyn Filter> + Send + Sync>;

/// A filter expression resolved against the registry, ready to apply
#[derive(Clone)]
pub struct ResolvedFilter {
    filter: Arc<dyn Filter>,
    amount: f32,
}

impl ResolvedFilter {
    pub fn name(&self) -> &str {
        self.filter.name()
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn apply(&self, frame: &mut Frame, frame_index: u64) -> Result<()> {
        self.filter.apply(frame, &FilterParams::new(self.amount, frame_index))
    }
}

impl std::fmt::Debug for ResolvedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.filter.name(), self.amount)
    }
}

/// Registry of named visual filters
///
/// The registry provides a central place to discover and instantiate filters.
/// Filters are registered by name and resolved from clip filter expressions.
pub struct FilterRegistry {
    filters: HashMap<String, FilterFactory>,
}

impl FilterRegistry {
    /// Create a new filter registry with all built-in filters
    pub fn new() -> Self {
        let mut registry = Self {
            filters: HashMap::new(),
        };
        registry.register_builtin_filters();
        registry
    }

    fn register_builtin_filters(&mut self) {
        self.register("grayscale", || Box::new(Grayscale));
        self.register("sepia", || Box::new(Sepia));
        self.register("invert", || Box::new(Invert));
        self.register("brightness", || Box::new(Brightness));
        self.register("contrast", || Box::new(Contrast));
        self.register("saturate", || Box::new(Saturate));
        self.register("vhs", || Box::new(VhsFilter::new()));
    }

    /// Register a custom filter, replacing any filter with the same name
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        self.filters.insert(name.to_ascii_lowercase(), Box::new(factory));
    }

    /// Get a new instance of a filter by name
    pub fn get_filter(&self, name: &str) -> Option<Box<dyn Filter>> {
        self.filters.get(name).map(|factory| factory())
    }

    /// Check if a filter is available. `none` is always available.
    pub fn has_filter(&self, name: &str) -> bool {
        name == "none" || self.filters.contains_key(name)
    }

    /// All registered filter names, sorted
    pub fn available_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Parse and resolve a filter expression.
    ///
    /// Returns `None` for `none`, which leaves frames untouched.
    pub fn resolve(&self, expression: &str) -> Result<Option<ResolvedFilter>> {
        let spec = FilterSpec::parse(expression)?;
        if spec.is_none() {
            return Ok(None);
        }

        let filter = self
            .get_filter(&spec.name)
            .ok_or_else(|| FilterError::NotFound { name: spec.name.clone() })?;

        let amount = spec.amount.unwrap_or_else(|| filter.default_amount());
        filter.validate_amount(amount)?;

        Ok(Some(ResolvedFilter {
            filter: Arc::from(filter),
            amount,
        }))
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_filters_available() {
        let registry = FilterRegistry::new();

        for name in ["grayscale", "sepia", "invert", "brightness", "contrast", "saturate", "vhs"] {
            assert!(registry.has_filter(name), "{}", name);
        }
        assert!(registry.has_filter("none"));
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn test_resolve_none() {
        let registry = FilterRegistry::new();
        assert!(registry.resolve("none").unwrap().is_none());
        assert!(registry.resolve("").unwrap().is_none());
    }

    #[test]
    fn test_resolve_uses_default_amount() {
        let registry = FilterRegistry::new();
        let vhs = registry.resolve("vhs").unwrap().unwrap();
        assert_eq!(vhs.name(), "vhs");
        assert_eq!(vhs.amount(), 0.8);

        let sepia = registry.resolve("sepia(30%)").unwrap().unwrap();
        assert!((sepia.amount() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_filter_is_an_input_error() {
        let registry = FilterRegistry::new();
        let err = registry.resolve("blur(4)").unwrap_err();
        assert_eq!(err.stage(), crate::error::FailureStage::Input);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let registry = FilterRegistry::new();
        assert!(registry.resolve("brightness(-1)").is_err());
    }

    #[test]
    fn test_custom_filter_registration() {
        let mut registry = FilterRegistry::new();
        registry.register("Mono", || Box::new(Grayscale));

        assert!(registry.has_filter("mono"));
        let mut frame = Frame::new_filled(2, 2, [255, 0, 0]);
        registry
            .resolve("mono")
            .unwrap()
            .unwrap()
            .apply(&mut frame, 0)
            .unwrap();
        let [r, g, b] = frame.get_pixel(0, 0);
        assert!(r == g && g == b);
    }
}
