use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::OrderStatus;

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusStat {
    pub status: OrderStatus,
    pub count: i64,
    /// Σ order total, minor units.
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: i64,
    pub items_sold: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopItem {
    pub menu_item_id: Uuid,
    pub name: String,
    pub total_quantity: i64,
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub order_stats: Vec<StatusStat>,
    pub category_revenue: Vec<CategoryRevenue>,
    pub top_items: Vec<TopItem>,
}
