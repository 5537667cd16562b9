use salvo::prelude::*;
use serde_json::json;

use crate::db::DbType;
use crate::web::web_state;

#[handler]
pub async fn health_check(res: &mut Response) {
    res.render("OK");
}

#[handler]
pub async fn get_status(res: &mut Response) {
    let Some(state) = web_state() else {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
        res.render(Json(json!({ "status": "starting" })));
        return;
    };

    let database = match state.db_manager.db_type() {
        DbType::Postgres => "postgres",
        DbType::Sqlite => "sqlite",
    };

    res.render(Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "database": database,
    })));
}
