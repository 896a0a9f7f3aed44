use std::sync::Arc;

use crate::application::query::QueryService;

#[derive(Clone)]
pub struct ApiState {
    pub queries: Arc<QueryService>,
}
