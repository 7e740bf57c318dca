//! Task catalog endpoint.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::catalog::CatalogEntry;
use crate::controller::Controller;

pub async fn list_catalog(State(ctl): State<Arc<Controller>>) -> Json<Vec<CatalogEntry>> {
    Json(ctl.catalog_entries())
}
