//! Fleet state endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::controller::Controller;
use crate::registry::NodeRecord;

/// Same list viewers receive as `stats_snapshot`.
pub async fn list_nodes(State(ctl): State<Arc<Controller>>) -> Json<Vec<NodeRecord>> {
    Json(ctl.registry().snapshot())
}

/// One node by id, including the controller's own `local` node.
pub async fn get_node(
    State(ctl): State<Arc<Controller>>,
    Path(id): Path<String>,
) -> Result<Json<NodeRecord>, StatusCode> {
    ctl.registry()
        .get(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
