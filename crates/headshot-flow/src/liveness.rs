use crate::error::FlowError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Mount flag shared between a workflow and the view driving it.
///
/// Clones observe the same flag. Once unmounted, a workflow discards every
/// result that arrives afterwards.
#[derive(Debug, Clone)]
pub struct Liveness {
    mounted: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn ensure_mounted(&self) -> Result<(), FlowError> {
        if self.is_mounted() {
            Ok(())
        } else {
            tracing::debug!("view unmounted; discarding result");
            Err(FlowError::Detached)
        }
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
