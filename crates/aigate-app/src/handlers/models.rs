use aigate_contracts::{ModelEntry, ModelList};
use axum::{
    Json,
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// `json` returns the catalog as JSON instead of an HTML table.
    pub query: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelSearchResponse {
    pub data: Vec<ModelEntry>,
}

#[utoipa::path(
    get,
    path = "/v1/models",
    responses(
        (status = 200, description = "Model catalog", body = ModelList),
        (status = 401, description = "Missing or invalid bearer token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "models"
)]
#[instrument(skip(state))]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let models = state.catalog().models().await;
    Json(ModelList { object: "list".to_string(), data: models.as_ref().clone() })
}

#[utoipa::path(
    get,
    path = "/models/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Catalog as JSON (`query=json`) or an HTML table", body = ModelSearchResponse)
    ),
    tag = "models"
)]
#[instrument(skip(state))]
pub async fn search_models(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let models = state.catalog().models().await;
    if params.query.as_deref() == Some("json") {
        return Json(ModelSearchResponse { data: models.as_ref().clone() }).into_response();
    }
    Html(render_table(&models)).into_response()
}

fn render_table(models: &[ModelEntry]) -> String {
    let mut sorted: Vec<&ModelEntry> = models.iter().collect();
    sorted.sort_by(|a, b| a.task_name.cmp(&b.task_name).then_with(|| a.id.cmp(&b.id)));

    let rows: String = sorted
        .iter()
        .map(|model| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&model.id),
                escape_html(model.task_name.as_deref().unwrap_or_default()),
                if model.in_use { "yes" } else { "no" },
                escape_html(&model.description),
                escape_html(model.task_description.as_deref().unwrap_or_default()),
            )
        })
        .collect();

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Models</title></head>\n<body>\n\
         <table>\n<tr><th>id</th><th>task</th><th>in use</th><th>description</th><th>task description</th></tr>\n\
         {rows}</table>\n</body>\n</html>\n"
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
