//! Extraction of the cpuset hint from a container's environment.

use serde::{Deserialize, Serialize};

/// Default prefix of the hint variables injected by the DRA driver.
pub const DEFAULT_ENV_PREFIX: &str = "FLUXBIND";

/// The only value (case-insensitive) that turns reversal on.
const REVERSAL_TOKEN: &str = "yes";

/// Raw cpuset hint as found in the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityHint {
    /// Hex mask, empty when the variable is absent.
    pub hex_mask: String,
    /// Whether the requester asked for reversed CPU order.
    pub reverse: bool,
}

impl AffinityHint {
    /// True when no mask variable was present.
    pub fn is_empty(&self) -> bool {
        self.hex_mask.is_empty()
    }
}

/// Names of the two hint variables, `{PREFIX}_CPUSET` and `{PREFIX}_CPUSET_REVERSED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintVariables {
    mask: String,
    reversed: String,
}

impl HintVariables {
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            mask: format!("{prefix}_CPUSET"),
            reversed: format!("{prefix}_CPUSET_REVERSED"),
        }
    }

    /// Name of the mask variable.
    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Name of the reversal flag variable.
    pub fn reversed(&self) -> &str {
        &self.reversed
    }

    /// Scan `NAME=VALUE` assignments in declaration order.
    ///
    /// Later assignments overwrite earlier ones for both variables.
    pub fn extract<S: AsRef<str>>(&self, env: &[S]) -> AffinityHint {
        let mut hint = AffinityHint::default();

        for assignment in env {
            let Some((name, value)) = assignment.as_ref().split_once('=') else {
                continue;
            };

            if name == self.mask {
                hint.hex_mask = value.to_string();
            } else if name == self.reversed {
                hint.reverse = value.eq_ignore_ascii_case(REVERSAL_TOKEN);
            }
        }

        hint
    }
}

impl Default for HintVariables {
    fn default() -> Self {
        Self::from_prefix(DEFAULT_ENV_PREFIX)
    }
}

/// Extract the hint using the default `FLUXBIND_` variable names.
pub fn extract_hint<S: AsRef<str>>(env: &[S]) -> AffinityHint {
    HintVariables::default().extract(env)
}
