//! Client-side instance selection.

use crate::error::{EngineError, Result};
use crate::models::instance::ServiceInstance;

/// Uniform-random selection over a candidate set.
///
/// The registry may already balance on its side; the client still picks
/// randomly among whatever it was given. Both layers are kept deliberately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadBalancer;

impl LoadBalancer {
    pub fn new() -> Self {
        Self
    }

    /// Pick one instance. A single candidate is returned directly without
    /// consulting the RNG; an empty candidate set is a caller error.
    pub fn select_instance<'a>(
        &self,
        candidates: &'a [ServiceInstance],
    ) -> Result<&'a ServiceInstance> {
        match candidates {
            [] => Err(EngineError::Validation(
                "cannot select an instance from an empty candidate set".to_string(),
            )),
            [only] => Ok(only),
            many => Ok(&many[fastrand::usize(..many.len())]),
        }
    }
}
