use std::collections::HashMap;

use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::OrmConn,
    dto::orders::{CreateOrderRequest, CustomerRef, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    entity::{
        menu_items::{Column as MenuItemCol, Entity as MenuItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        tables::{ActiveModel as TableActive, Column as TableCol, Entity as Tables},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_staff},
    models::{Order, OrderItem, OrderStatus, TableStatus},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
};

/// Fixed tax rate: 5% of the subtotal, floor-rounded in cents.
const TAX_RATE_PERCENT: i64 = 5;

fn compute_tax(subtotal: i64) -> i64 {
    subtotal * TAX_RATE_PERCENT / 100
}

pub async fn create_order(
    state: &AppState,
    customer_id: Option<Uuid>,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".into()));
    }

    let txn = state.orm.begin().await?;

    let table = Tables::find_by_id(payload.table_id).one(&txn).await?;
    let table = match table {
        Some(t) => t,
        None => return Err(AppError::NotFound),
    };

    // Resolve and validate every line before any mutation; dropping the
    // transaction on error rolls everything back.
    let mut lines: Vec<(Uuid, String, i64, i32, Option<String>)> = Vec::new();
    let mut subtotal: i64 = 0;

    for line in &payload.items {
        if line.quantity < 1 {
            return Err(AppError::BadRequest(format!(
                "Invalid quantity for item {}",
                line.menu_item_id
            )));
        }

        let menu_item = MenuItems::find_by_id(line.menu_item_id).one(&txn).await?;
        let menu_item = match menu_item {
            Some(m) if m.availability => m,
            _ => {
                return Err(AppError::BadRequest(format!(
                    "Item {} not available",
                    line.menu_item_id
                )));
            }
        };

        subtotal += menu_item.price * line.quantity as i64;
        lines.push((
            menu_item.id,
            menu_item.name,
            menu_item.price,
            line.quantity,
            line.note.clone(),
        ));
    }

    let tax = compute_tax(subtotal);
    let total = subtotal + tax;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        table_id: Set(table.id),
        customer_id: Set(customer_id),
        session_token: Set(payload.session_token.clone()),
        status: Set(OrderStatus::Placed.as_str().into()),
        subtotal: Set(subtotal),
        tax: Set(tax),
        total: Set(total),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::new();

    for (menu_item_id, name, price, quantity, note) in lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            menu_item_id: Set(menu_item_id),
            name: Set(name),
            price: Set(price),
            quantity: Set(quantity),
            note: Set(note),
        }
        .insert(&txn)
        .await?;

        order_items.push(order_item_from_entity(item));

        // Popularity bumps happen in the database so concurrent orders on
        // the same item cannot lose updates.
        MenuItems::update_many()
            .col_expr(
                MenuItemCol::Popularity,
                Expr::col(MenuItemCol::Popularity).add(quantity as i64),
            )
            .filter(MenuItemCol::Id.eq(menu_item_id))
            .exec(&txn)
            .await?;
    }

    // The table is occupied regardless of its previous status.
    let table_number = table.number;
    let mut table_active: TableActive = table.into();
    table_active.status = Set(TableStatus::Occupied.as_str().into());
    table_active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        customer_id,
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": order.total })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let order = order_from_entity(order)?;
    Ok(ApiResponse::success(
        "Order placed",
        OrderWithItems {
            order,
            items: order_items,
            table_number: Some(table_number),
            customer: None,
        },
        Some(Meta::empty()),
    ))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_staff(user)?;

    let status = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid order status {}", payload.status)))?;

    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let mut active: OrderActive = existing.into();
    active.status = Set(status.as_str().into());
    active.updated_at = Set(chrono::Utc::now().into());
    let order = active.update(&state.orm).await?;

    // Leaving the active set may free the table. The count is taken fresh
    // at transition time so concurrent completions on the same table
    // converge on the correct final state.
    if status.is_terminal() {
        let active_orders = Orders::find()
            .filter(OrderCol::TableId.eq(order.table_id))
            .filter(OrderCol::Status.is_in(OrderStatus::ACTIVE.map(|s| s.as_str())))
            .count(&state.orm)
            .await?;

        if active_orders == 0 {
            if let Some(table) = Tables::find_by_id(order.table_id).one(&state.orm).await? {
                let mut table_active: TableActive = table.into();
                table_active.status = Set(TableStatus::Available.as_str().into());
                table_active.update(&state.orm).await?;
            }
        }
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let mut resolved = resolve_orders(&state.orm, vec![order]).await?;
    let data = match resolved.pop() {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Order updated", data, Some(Meta::empty())))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_staff(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }
    if let Some(table_id) = query.table {
        condition = condition.add(OrderCol::TableId.eq(table_id));
    }

    let finder = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = resolve_orders(&state.orm, orders).await?;
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_my_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<OrderList>> {
    let orders = Orders::find()
        .filter(OrderCol::CustomerId.eq(user.user_id))
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let items = resolve_orders(&state.orm, orders).await?;
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(state: &AppState, id: Uuid) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let mut resolved = resolve_orders(&state.orm, vec![order]).await?;
    let data = match resolved.pop() {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Order", data, Some(Meta::empty())))
}

/// Attach line items and table numbers to a page of orders with two
/// batched lookups instead of one query per order.
async fn resolve_orders(orm: &OrmConn, models: Vec<OrderModel>) -> AppResult<Vec<OrderWithItems>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = models.iter().map(|o| o.id).collect();
    let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(order_ids))
        .all(orm)
        .await?
    {
        items_by_order
            .entry(item.order_id)
            .or_default()
            .push(order_item_from_entity(item));
    }

    let mut table_ids: Vec<Uuid> = models.iter().map(|o| o.table_id).collect();
    table_ids.sort_unstable();
    table_ids.dedup();
    let table_numbers: HashMap<Uuid, i32> = Tables::find()
        .filter(TableCol::Id.is_in(table_ids))
        .all(orm)
        .await?
        .into_iter()
        .map(|t| (t.id, t.number))
        .collect();

    let mut customer_ids: Vec<Uuid> = models.iter().filter_map(|o| o.customer_id).collect();
    customer_ids.sort_unstable();
    customer_ids.dedup();
    let customers: HashMap<Uuid, CustomerRef> = if customer_ids.is_empty() {
        HashMap::new()
    } else {
        Users::find()
            .filter(UserCol::Id.is_in(customer_ids))
            .all(orm)
            .await?
            .into_iter()
            .map(|u| {
                (
                    u.id,
                    CustomerRef {
                        id: u.id,
                        name: u.name,
                        email: u.email,
                    },
                )
            })
            .collect()
    };

    let mut resolved = Vec::with_capacity(models.len());
    for model in models {
        let table_number = table_numbers.get(&model.table_id).copied();
        let customer = model
            .customer_id
            .and_then(|id| customers.get(&id).cloned());
        let items = items_by_order.remove(&model.id).unwrap_or_default();
        resolved.push(OrderWithItems {
            order: order_from_entity(model)?,
            items,
            table_number,
            customer,
        });
    }
    Ok(resolved)
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let status = OrderStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unknown order status in store: {}",
            model.status
        ))
    })?;
    Ok(Order {
        id: model.id,
        table_id: model.table_id,
        customer_id: model.customer_id,
        session_token: model.session_token,
        status,
        subtotal: model.subtotal,
        tax: model.tax,
        total: model.total,
        created_at: model.created_at.with_timezone(&chrono::Utc),
        updated_at: model.updated_at.with_timezone(&chrono::Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        menu_item_id: model.menu_item_id,
        name: model.name,
        price: model.price,
        quantity: model.quantity,
        note: model.note,
    }
}

#[cfg(test)]
mod tests {
    use super::compute_tax;

    #[test]
    fn tax_is_five_percent_floor() {
        assert_eq!(compute_tax(0), 0);
        assert_eq!(compute_tax(2000), 100);
        assert_eq!(compute_tax(2010), 100);
        assert_eq!(compute_tax(2019), 100);
        assert_eq!(compute_tax(2020), 101);
    }
}
