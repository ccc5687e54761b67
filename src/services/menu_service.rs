use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::menu::{
        CategoryList, CreateCategoryRequest, CreateMenuItemRequest, MenuItemList,
        MenuItemWithCategory, UpdateCategoryRequest, UpdateMenuItemRequest,
    },
    entity::{
        menu_categories::{
            ActiveModel as CategoryActive, Column as CategoryCol, Entity as MenuCategories,
            Model as CategoryModel,
        },
        menu_items::{
            ActiveModel as MenuItemActive, Column as MenuItemCol, Entity as MenuItems,
            Model as MenuItemModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{MenuCategory, MenuItem},
    response::{ApiResponse, Meta},
    routes::params::{MenuItemQuery, MenuSort},
    state::AppState,
};

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items = MenuCategories::find()
        .filter(CategoryCol::Active.eq(true))
        .order_by_asc(CategoryCol::DisplayOrder)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<MenuCategory>> {
    ensure_admin(user)?;
    let active = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        display_order: Set(payload.display_order.unwrap_or(0)),
        active: Set(payload.active.unwrap_or(true)),
        created_at: NotSet,
    };
    let category = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_create",
        Some("menu_categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category created",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<MenuCategory>> {
    ensure_admin(user)?;
    let existing = MenuCategories::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    let mut active: CategoryActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(display_order) = payload.display_order {
        active.display_order = Set(display_order);
    }
    if let Some(is_active) = payload.active {
        active.active = Set(is_active);
    }
    let category = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_update",
        Some("menu_categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category updated",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = MenuCategories::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_delete",
        Some("menu_categories"),
        Some(serde_json::json!({ "category_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_menu_items(
    state: &AppState,
    query: MenuItemQuery,
) -> AppResult<ApiResponse<MenuItemList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.search.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(MenuItemCol::Name).ilike(pattern.clone()))
                .add(Expr::col(MenuItemCol::Description).ilike(pattern)),
        );
    }

    if let Some(category) = query.category {
        condition = condition.add(MenuItemCol::CategoryId.eq(category));
    }

    // Customers only see what the kitchen can make; staff may ask for
    // unavailable items explicitly.
    condition = condition.add(MenuItemCol::Availability.eq(query.availability.unwrap_or(true)));

    let finder = MenuItems::find().filter(condition);
    let finder = match query.sort.unwrap_or(MenuSort::Name) {
        MenuSort::Name => finder.order_by_asc(MenuItemCol::Name),
        MenuSort::PriceAsc => finder.order_by_asc(MenuItemCol::Price),
        MenuSort::PriceDesc => finder.order_by_desc(MenuItemCol::Price),
        MenuSort::Popularity => finder.order_by_desc(MenuItemCol::Popularity),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = with_category_names(state, models).await?;
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Menu items",
        MenuItemList { items },
        Some(meta),
    ))
}

pub async fn get_menu_item(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<MenuItemWithCategory>> {
    let model = MenuItems::find_by_id(id).one(&state.orm).await?;
    let model = match model {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    let mut items = with_category_names(state, vec![model]).await?;
    let item = match items.pop() {
        Some(i) => i,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Menu item", item, None))
}

pub async fn create_menu_item(
    state: &AppState,
    user: &AuthUser,
    payload: CreateMenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    ensure_admin(user)?;
    if payload.price < 0 {
        return Err(AppError::BadRequest("price must be non-negative".into()));
    }

    let category = MenuCategories::find_by_id(payload.category_id)
        .one(&state.orm)
        .await?;
    if category.is_none() {
        return Err(AppError::BadRequest(format!(
            "Category {} does not exist",
            payload.category_id
        )));
    }

    let active = MenuItemActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        availability: Set(payload.availability.unwrap_or(true)),
        popularity: Set(0),
        category_id: Set(payload.category_id),
        image_url: Set(payload.image_url),
        created_at: NotSet,
    };
    let item = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "menu_item_create",
        Some("menu_items"),
        Some(serde_json::json!({ "menu_item_id": item.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Menu item created",
        menu_item_from_entity(item),
        Some(Meta::empty()),
    ))
}

pub async fn update_menu_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateMenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    ensure_admin(user)?;
    if payload.price.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("price must be non-negative".into()));
    }

    let existing = MenuItems::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    // Popularity is only ever moved by order placement.
    let mut active: MenuItemActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(availability) = payload.availability {
        active.availability = Set(availability);
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(category_id);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }
    let item = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "menu_item_update",
        Some("menu_items"),
        Some(serde_json::json!({ "menu_item_id": item.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Menu item updated",
        menu_item_from_entity(item),
        Some(Meta::empty()),
    ))
}

pub async fn delete_menu_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = MenuItems::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "menu_item_delete",
        Some("menu_items"),
        Some(serde_json::json!({ "menu_item_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Menu item deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn with_category_names(
    state: &AppState,
    models: Vec<MenuItemModel>,
) -> AppResult<Vec<MenuItemWithCategory>> {
    let mut category_ids: Vec<Uuid> = models.iter().map(|m| m.category_id).collect();
    category_ids.sort_unstable();
    category_ids.dedup();

    let names: HashMap<Uuid, String> = if category_ids.is_empty() {
        HashMap::new()
    } else {
        MenuCategories::find()
            .filter(CategoryCol::Id.is_in(category_ids))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect()
    };

    Ok(models
        .into_iter()
        .map(|m| {
            let category_name = names.get(&m.category_id).cloned();
            MenuItemWithCategory {
                item: menu_item_from_entity(m),
                category_name,
            }
        })
        .collect())
}

fn category_from_entity(model: CategoryModel) -> MenuCategory {
    MenuCategory {
        id: model.id,
        name: model.name,
        display_order: model.display_order,
        active: model.active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn menu_item_from_entity(model: MenuItemModel) -> MenuItem {
    MenuItem {
        id: model.id,
        name: model.name,
        description: model.description,
        price: model.price,
        availability: model.availability,
        popularity: model.popularity,
        category_id: model.category_id,
        image_url: model.image_url,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
