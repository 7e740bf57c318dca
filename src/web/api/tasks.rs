//! Dispatched task history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::controller::Controller;
use crate::engine::TaskSnapshot;

pub async fn list_tasks(State(ctl): State<Arc<Controller>>) -> Json<Vec<TaskSnapshot>> {
    Json(ctl.supervisor().list())
}

pub async fn get_task(
    State(ctl): State<Arc<Controller>>,
    Path(request_id): Path<String>,
) -> Result<Json<TaskSnapshot>, StatusCode> {
    ctl.supervisor()
        .get(&request_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
