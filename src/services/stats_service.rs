use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    dto::stats::{CategoryRevenue, StatsResponse, StatusStat, TopItem},
    entity::{
        menu_categories::{Column as CategoryCol, Entity as MenuCategories},
        menu_items::{Column as MenuItemCol, Entity as MenuItems},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_staff},
    models::OrderStatus,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Rollups over orders created since local midnight. Read-only; an empty
/// day yields empty vectors.
pub async fn get_stats(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<StatsResponse>> {
    ensure_staff(user)?;

    let since = start_of_today()?;

    let todays_orders = Orders::find()
        .filter(OrderCol::CreatedAt.gte(since))
        .all(&state.orm)
        .await?;

    // Per-status counts and revenue over all of today's orders.
    let mut by_status: HashMap<&'static str, (i64, i64)> = HashMap::new();
    for order in &todays_orders {
        let status = OrderStatus::parse(&order.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown order status in store: {}",
                order.status
            ))
        })?;
        let entry = by_status.entry(status.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += order.total;
    }

    let order_stats: Vec<StatusStat> = [
        OrderStatus::Placed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
        OrderStatus::Canceled,
    ]
    .into_iter()
    .filter_map(|status| {
        by_status
            .get(status.as_str())
            .map(|&(count, revenue)| StatusStat {
                status,
                count,
                revenue,
            })
    })
    .collect();

    // Line-item rollups exclude canceled orders.
    let counted_ids: Vec<Uuid> = todays_orders
        .iter()
        .filter(|o| o.status != OrderStatus::Canceled.as_str())
        .map(|o| o.id)
        .collect();

    let lines = if counted_ids.is_empty() {
        Vec::new()
    } else {
        OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(counted_ids))
            .all(&state.orm)
            .await?
    };

    let category_revenue = category_revenue(state, &lines).await?;
    let top_items = top_items(&lines);

    Ok(ApiResponse::success(
        "Stats",
        StatsResponse {
            order_stats,
            category_revenue,
            top_items,
        },
        Some(Meta::empty()),
    ))
}

/// Join each line's menu item to its category and sum revenue per
/// category name. Lines whose item or category has since been deleted
/// drop out of the rollup.
async fn category_revenue(
    state: &AppState,
    lines: &[crate::entity::order_items::Model],
) -> AppResult<Vec<CategoryRevenue>> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let mut item_ids: Vec<Uuid> = lines.iter().map(|l| l.menu_item_id).collect();
    item_ids.sort_unstable();
    item_ids.dedup();

    let item_categories: HashMap<Uuid, Uuid> = MenuItems::find()
        .filter(MenuItemCol::Id.is_in(item_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|m| (m.id, m.category_id))
        .collect();

    let mut category_ids: Vec<Uuid> = item_categories.values().copied().collect();
    category_ids.sort_unstable();
    category_ids.dedup();

    let category_names: HashMap<Uuid, String> = MenuCategories::find()
        .filter(CategoryCol::Id.is_in(category_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut by_category: HashMap<String, (i64, i64)> = HashMap::new();
    for line in lines {
        let Some(category_id) = item_categories.get(&line.menu_item_id) else {
            continue;
        };
        let Some(name) = category_names.get(category_id) else {
            continue;
        };
        let entry = by_category.entry(name.clone()).or_insert((0, 0));
        entry.0 += line.price * line.quantity as i64;
        entry.1 += line.quantity as i64;
    }

    let mut rollup: Vec<CategoryRevenue> = by_category
        .into_iter()
        .map(|(category, (revenue, items_sold))| CategoryRevenue {
            category,
            revenue,
            items_sold,
        })
        .collect();
    rollup.sort_by(|a, b| b.revenue.cmp(&a.revenue));
    Ok(rollup)
}

/// Top ten items by quantity sold, using the snapshot name captured at
/// order time.
fn top_items(lines: &[crate::entity::order_items::Model]) -> Vec<TopItem> {
    let mut by_item: HashMap<Uuid, TopItem> = HashMap::new();
    for line in lines {
        let entry = by_item.entry(line.menu_item_id).or_insert_with(|| TopItem {
            menu_item_id: line.menu_item_id,
            name: line.name.clone(),
            total_quantity: 0,
            revenue: 0,
        });
        entry.total_quantity += line.quantity as i64;
        entry.revenue += line.price * line.quantity as i64;
    }

    let mut top: Vec<TopItem> = by_item.into_values().collect();
    top.sort_by(|a, b| b.total_quantity.cmp(&a.total_quantity));
    top.truncate(10);
    top
}

fn start_of_today() -> AppResult<DateTime<Utc>> {
    let midnight = Local::now()
        .with_time(NaiveTime::MIN)
        .earliest()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("local midnight is ambiguous")))?;
    Ok(midnight.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::order_items::Model as Line;

    fn line(item: Uuid, name: &str, price: i64, quantity: i32) -> Line {
        Line {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            menu_item_id: item,
            name: name.into(),
            price,
            quantity,
            note: None,
        }
    }

    #[test]
    fn top_items_groups_and_ranks_by_quantity() {
        let burger = Uuid::new_v4();
        let fries = Uuid::new_v4();
        let lines = vec![
            line(burger, "Burger", 900, 2),
            line(fries, "Fries", 300, 5),
            line(burger, "Burger", 900, 1),
        ];

        let top = top_items(&lines);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "Fries");
        assert_eq!(top[0].total_quantity, 5);
        assert_eq!(top[1].total_quantity, 3);
        assert_eq!(top[1].revenue, 2700);
    }

    #[test]
    fn top_items_caps_at_ten() {
        let lines: Vec<Line> = (0..15)
            .map(|i| line(Uuid::new_v4(), &format!("Item {i}"), 100, i + 1))
            .collect();
        assert_eq!(top_items(&lines).len(), 10);
    }

    #[test]
    fn top_items_empty_input() {
        assert!(top_items(&[]).is_empty());
    }
}
