use std::sync::Arc;
use taleshelf::AppContext;
use taleshelf::ports::SessionVerifier;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub context: AppContext,
    pub sessions: Arc<dyn SessionVerifier>,
}

impl AppState {
    pub fn new(context: AppContext, sessions: Arc<dyn SessionVerifier>) -> Self {
        Self { context, sessions }
    }
}
