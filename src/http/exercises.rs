use crate::http::{ApiContext, Error, Result};
use crate::models::listing::parse_or;
use crate::upstream::exercisedb::{Exercise, ExerciseDbError};
use crate::workout::catalog::{self, AREAS, GROUPS};
use crate::workout::plan::{self, Day, Volume, VolumeQuery};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rand::seq::SliceRandom;
use serde_json::Value;
use std::time::Duration;

const HEALTH_NOTE: &str = "If ok=false, verify RAPIDAPI_KEY and host.";

pub(crate) fn router() -> Router<ApiContext> {
    Router::new()
        .route("/api/exercises/health", get(upstream_health))
        .route("/api/exercises/groups", get(list_groups))
        .route("/api/exercises/areas", get(list_areas))
        .route("/api/exercises/group/:group", get(group_exercises))
        .route("/api/exercises/area/:area", get(area_exercises))
        .route("/api/exercises/plans/group/:group", get(group_plan))
        .route("/api/exercises/plans/area/:area", get(area_plan))
        .route("/api/exercises/exercise/:id", get(get_exercise))
        .route("/api/exercises/targets", get(list_targets))
        .route("/api/exercises/target/:muscle", get(target_exercises))
}

/// `limit` falls back to `default` and is capped at `max`; `offset` defaults to 0.
#[derive(serde::Deserialize, Default, Debug)]
#[serde(default)]
struct PageQuery {
    limit: Option<String>,
    offset: Option<String>,
}

impl PageQuery {
    fn resolve(&self, default: i64, max: i64) -> (usize, usize) {
        let limit = parse_or(self.limit.as_deref(), default).clamp(0, max);
        let offset = parse_or(self.offset.as_deref(), 0).max(0);
        (limit as usize, offset as usize)
    }
}

#[derive(serde::Serialize)]
struct Page {
    total: usize,
    limit: usize,
    offset: usize,
    results: Vec<Exercise>,
}

impl Page {
    fn slice(all: Vec<Exercise>, (limit, offset): (usize, usize)) -> Self {
        Page {
            total: all.len(),
            limit,
            offset,
            results: all.into_iter().skip(offset).take(limit).collect(),
        }
    }
}

/// Which group or area a response is about. Members are left out when nothing was found.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum Scope {
    Group {
        group: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        targets: Option<&'static [&'static str]>,
    },
    Area {
        area: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        groups: Option<&'static [&'static str]>,
    },
}

impl Scope {
    fn label(&self) -> &'static str {
        match self {
            Scope::Group { group, .. } => *group,
            Scope::Area { area, .. } => *area,
        }
    }

    fn without_members(self) -> Self {
        match self {
            Scope::Group { group, .. } => Scope::Group {
                group,
                targets: None,
            },
            Scope::Area { area, .. } => Scope::Area { area, groups: None },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Scope::Group { .. } => "group",
            Scope::Area { .. } => "area",
        }
    }
}

#[derive(serde::Serialize)]
struct ScopedPage {
    #[serde(flatten)]
    scope: Scope,
    #[serde(flatten)]
    page: Page,
}

#[derive(serde::Serialize)]
struct Plan {
    #[serde(flatten)]
    scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    days: Vec<Day>,
    volume: Volume,
}

fn group_scope(name: &str) -> Result<(Scope, Vec<&'static str>)> {
    let (group, targets) = catalog::find_group(name)
        .ok_or_else(|| Error::not_found(format!("Unknown group \"{}\"", name)))?;

    Ok((
        Scope::Group {
            group,
            targets: Some(targets),
        },
        targets.to_vec(),
    ))
}

fn area_scope(name: &str) -> Result<(Scope, Vec<&'static str>)> {
    let (area, groups) = catalog::find_area(name)
        .ok_or_else(|| Error::not_found(format!("Unknown area \"{}\"", name)))?;

    Ok((
        Scope::Area {
            area,
            groups: Some(groups),
        },
        catalog::area_targets(groups),
    ))
}

fn throttle(ctx: &ApiContext) -> Duration {
    Duration::from_millis(ctx.config.exercisedb_throttle_ms)
}

/// Map a failed passthrough call onto the response the client sees.
///
/// Upstream statuses are relayed as-is; anything else is a 500.
fn passthrough_error(e: ExerciseDbError, what: &str) -> Error {
    match e {
        ExerciseDbError::Status { status, message } => Error::Upstream { status, message },
        ExerciseDbError::MissingKey => Error::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: ExerciseDbError::MissingKey.to_string(),
        },
        e => {
            log::error!("fetching {} from ExerciseDB failed: {}", what, e);
            Error::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("Server error fetching {}", what),
            }
        }
    }
}

#[derive(serde::Serialize)]
struct UpstreamHealth {
    ok: bool,
    host: String,
    note: &'static str,
}

#[derive(serde::Serialize)]
struct UpstreamDown {
    ok: bool,
    error: String,
}

async fn upstream_health(ctx: State<ApiContext>) -> Response {
    match ctx.exercises.ping().await {
        Ok(ok) => Json(UpstreamHealth {
            ok,
            host: ctx.exercises.host(),
            note: HEALTH_NOTE,
        })
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(UpstreamDown {
                ok: false,
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

#[derive(serde::Serialize)]
struct GroupEntry {
    group: &'static str,
    targets: &'static [&'static str],
}

#[derive(serde::Serialize)]
struct AreaEntry {
    area: &'static str,
    groups: &'static [&'static str],
}

async fn list_groups() -> Json<Vec<GroupEntry>> {
    Json(
        GROUPS
            .iter()
            .map(|&(group, targets)| GroupEntry { group, targets })
            .collect(),
    )
}

async fn list_areas() -> Json<Vec<AreaEntry>> {
    Json(
        AREAS
            .iter()
            .map(|&(area, groups)| AreaEntry { area, groups })
            .collect(),
    )
}

async fn group_exercises(
    ctx: State<ApiContext>,
    Path(group): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ScopedPage>> {
    let (scope, targets) = group_scope(&group)?;
    let all = catalog::fetch_targets(ctx.exercises.as_ref(), &targets, throttle(&ctx)).await;

    Ok(Json(ScopedPage {
        scope,
        page: Page::slice(all, query.resolve(40, 100)),
    }))
}

async fn area_exercises(
    ctx: State<ApiContext>,
    Path(area): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ScopedPage>> {
    let (scope, targets) = area_scope(&area)?;
    let all = catalog::fetch_targets(ctx.exercises.as_ref(), &targets, throttle(&ctx)).await;

    Ok(Json(ScopedPage {
        scope,
        page: Page::slice(all, query.resolve(60, 120)),
    }))
}

async fn group_plan(
    ctx: State<ApiContext>,
    Path(group): Path<String>,
    Query(query): Query<VolumeQuery>,
) -> Result<Json<Plan>> {
    let (scope, targets) = group_scope(&group)?;
    Ok(Json(build_plan(&ctx, scope, &targets, &query).await))
}

async fn area_plan(
    ctx: State<ApiContext>,
    Path(area): Path<String>,
    Query(query): Query<VolumeQuery>,
) -> Result<Json<Plan>> {
    let (scope, targets) = area_scope(&area)?;
    Ok(Json(build_plan(&ctx, scope, &targets, &query).await))
}

async fn build_plan(
    ctx: &ApiContext,
    scope: Scope,
    targets: &[&str],
    query: &VolumeQuery,
) -> Plan {
    let volume = Volume::from_query(query);
    let days = volume.days as usize;
    let label = scope.label();

    let mut exercises =
        catalog::fetch_targets(ctx.exercises.as_ref(), targets, throttle(ctx)).await;

    if exercises.is_empty() {
        let message = format!("No exercises available for this {} right now.", scope.kind());
        return Plan {
            scope: scope.without_members(),
            total: None,
            message: Some(message),
            days: plan::build_days(vec![Vec::new(); days], label, &volume),
            volume,
        };
    }

    let total = exercises.len();
    let day_lists = {
        let mut rng = rand::thread_rng();
        exercises.shuffle(&mut rng);
        plan::balanced_days(exercises, days, volume.per_day as usize, &mut rng)
    };

    Plan {
        scope,
        total: Some(total),
        message: None,
        days: plan::build_days(day_lists, label, &volume),
        volume,
    }
}

async fn get_exercise(ctx: State<ApiContext>, Path(id): Path<String>) -> Result<Json<Exercise>> {
    let exercise = ctx
        .exercises
        .exercise_by_id(&id)
        .await
        .map_err(|e| passthrough_error(e, "exercise"))?
        .ok_or_else(|| Error::not_found("Exercise not found"))?;

    Ok(Json(exercise))
}

async fn list_targets(ctx: State<ApiContext>) -> Result<Json<Value>> {
    let targets = ctx
        .exercises
        .target_list()
        .await
        .map_err(|e| passthrough_error(e, "targets"))?;

    Ok(Json(targets))
}

async fn target_exercises(
    ctx: State<ApiContext>,
    Path(muscle): Path<String>,
    Query(query): Query<PageQuery>,
) -> Json<Page> {
    let all = catalog::fetch_target(ctx.exercises.as_ref(), &muscle).await;
    Json(Page::slice(all, query.resolve(20, 50)))
}
