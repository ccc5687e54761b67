use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::tables::{CreateTableRequest, TableList, TableQr, UpdateTableRequest},
    entity::tables::{
        ActiveModel as TableActive, Column as TableCol, Entity as Tables, Model as TableModel,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_staff},
    models::{Table, TableStatus},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn create_table(
    state: &AppState,
    user: &AuthUser,
    payload: CreateTableRequest,
) -> AppResult<ApiResponse<Table>> {
    ensure_admin(user)?;

    let existing = Tables::find()
        .filter(TableCol::Number.eq(payload.number))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("Table number already exists".into()));
    }

    let active = TableActive {
        id: Set(Uuid::new_v4()),
        number: Set(payload.number),
        qr_slug: Set(generate_slug()),
        status: Set(TableStatus::Available.as_str().into()),
        created_at: NotSet,
    };
    let table = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "table_create",
        Some("tables"),
        Some(serde_json::json!({ "table_id": table.id, "number": table.number })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Table created",
        table_from_entity(table)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_tables(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<TableList>> {
    ensure_staff(user)?;
    let items = Tables::find()
        .order_by_asc(TableCol::Number)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(table_from_entity)
        .collect::<AppResult<Vec<Table>>>()?;

    Ok(ApiResponse::success(
        "Tables",
        TableList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_table(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Table>> {
    ensure_staff(user)?;
    let table = Tables::find_by_id(id).one(&state.orm).await?;
    let table = match table {
        Some(t) => t,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Table", table_from_entity(table)?, None))
}

/// Customer entry point: resolves the slug printed on the table's QR code.
pub async fn get_table_by_slug(state: &AppState, slug: &str) -> AppResult<ApiResponse<Table>> {
    let table = Tables::find()
        .filter(TableCol::QrSlug.eq(slug))
        .one(&state.orm)
        .await?;
    let table = match table {
        Some(t) => t,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Table", table_from_entity(table)?, None))
}

pub async fn table_qr(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<TableQr>> {
    ensure_admin(user)?;
    let table = Tables::find_by_id(id).one(&state.orm).await?;
    let table = match table {
        Some(t) => t,
        None => return Err(AppError::NotFound),
    };

    let url = format!("{}/m/{}", state.config.frontend_url, table.qr_slug);
    Ok(ApiResponse::success(
        "Table QR",
        TableQr {
            url,
            table: table_from_entity(table)?,
        },
        Some(Meta::empty()),
    ))
}

pub async fn update_table(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateTableRequest,
) -> AppResult<ApiResponse<Table>> {
    ensure_admin(user)?;
    let existing = Tables::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(t) => t,
        None => return Err(AppError::NotFound),
    };

    if let Some(number) = payload.number {
        if number != existing.number {
            let clash = Tables::find()
                .filter(TableCol::Number.eq(number))
                .one(&state.orm)
                .await?;
            if clash.is_some() {
                return Err(AppError::BadRequest("Table number already exists".into()));
            }
        }
    }

    // The QR slug is minted once at creation and never changes; reprinted
    // codes keep working.
    let mut active: TableActive = existing.into();
    if let Some(number) = payload.number {
        active.number = Set(number);
    }
    if let Some(status) = payload.status {
        active.status = Set(status.as_str().into());
    }
    let table = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "table_update",
        Some("tables"),
        Some(serde_json::json!({ "table_id": table.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Table updated",
        table_from_entity(table)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_table(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Tables::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "table_delete",
        Some("tables"),
        Some(serde_json::json!({ "table_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Table deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Opaque 10-character token derived from a fresh uuid.
fn generate_slug() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..10].to_string()
}

fn table_from_entity(model: TableModel) -> AppResult<Table> {
    let status = TableStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unknown table status in store: {}",
            model.status
        ))
    })?;
    Ok(Table {
        id: model.id,
        number: model.number,
        qr_slug: model.qr_slug,
        status,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::generate_slug;

    #[test]
    fn slug_is_ten_lowercase_hex_chars() {
        let slug = generate_slug();
        assert_eq!(slug.len(), 10);
        assert!(slug.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn slugs_are_unique_enough() {
        let a = generate_slug();
        let b = generate_slug();
        assert_ne!(a, b);
    }
}
