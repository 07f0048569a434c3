use std::fmt;

use crate::{
    error::{FilterError, Result},
    video::types::Frame,
};

/// Core trait that all visual filters must implement
pub trait Filter: Send + Sync {
    /// Returns the unique name of this filter
    fn name(&self) -> &str;

    /// Returns a human-readable description of this filter
    fn description(&self) -> &str;

    /// Apply the filter to a composited frame in place
    ///
    /// # Arguments
    ///
    /// * `frame` - The output surface after the source image was drawn
    /// * `params` - Strength and per-frame context
    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()>;

    /// Strength used when the expression gives no argument
    fn default_amount(&self) -> f32 {
        1.0
    }

    /// Validate a parsed amount before rendering starts
    fn validate_amount(&self, amount: f32) -> Result<()> {
        if amount.is_finite() && amount >= 0.0 {
            Ok(())
        } else {
            Err(FilterError::Malformed {
                expression: format!("{}({})", self.name(), amount),
            }
            .into())
        }
    }
}

/// Per-application filter parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Strength of the effect; 1.0 is the filter's nominal strength
    pub amount: f32,

    /// Index of the frame being rendered, used to seed stochastic filters
    pub frame_index: u64,
}

impl FilterParams {
    pub fn new(amount: f32, frame_index: u64) -> Self {
        Self { amount, frame_index }
    }
}

/// A parsed filter expression such as `sepia`, `contrast(1.4)` or `grayscale(50%)`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub name: String,
    pub amount: Option<f32>,
}

impl FilterSpec {
    pub fn parse(expression: &str) -> Result<Self> {
        let malformed = || FilterError::Malformed {
            expression: expression.to_string(),
        };

        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Ok(Self::none());
        }

        let (name, amount) = match trimmed.find('(') {
            None => (trimmed, None),
            Some(open) => {
                let inner = trimmed[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
                (&trimmed[..open], Some(Self::parse_amount(inner.trim()).ok_or_else(malformed)?))
            }
        };

        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(malformed().into());
        }

        Ok(Self { name, amount })
    }

    /// `50%` → 0.5, `1.25` → 1.25
    fn parse_amount(text: &str) -> Option<f32> {
        let value = match text.strip_suffix('%') {
            Some(percent) => percent.trim().parse::<f32>().ok()? / 100.0,
            None => text.parse::<f32>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    pub fn none() -> Self {
        Self {
            name: "none".to_string(),
            amount: None,
        }
    }

    pub fn is_none(&self) -> bool {
        self.name == "none"
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.amount {
            Some(amount) => write!(f, "{}({})", self.name, amount),
            None => f.write_str(&self.name),
        }
    }
}
