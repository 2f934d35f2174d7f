use axum::Router;

pub mod records;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .merge(records::router(state.clone()))
        .with_state(state)
}
