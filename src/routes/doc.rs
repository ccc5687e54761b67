use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        menu::{
            CategoryList, CreateCategoryRequest, CreateMenuItemRequest, MenuItemList,
            MenuItemWithCategory, UpdateCategoryRequest, UpdateMenuItemRequest,
        },
        orders::{
            CreateOrderRequest, CustomerRef, OrderLineRequest, OrderList, OrderWithItems,
            UpdateOrderStatusRequest,
        },
        stats::{CategoryRevenue, StatsResponse, StatusStat, TopItem},
        tables::{CreateTableRequest, TableList, TableQr, UpdateTableRequest},
    },
    models::{MenuCategory, MenuItem, Order, OrderItem, OrderStatus, Table, TableStatus, User},
    response::{ApiResponse, Meta},
    routes::{auth, health, menu, orders, params, tables},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::profile,
        menu::list_categories,
        menu::create_category,
        menu::update_category,
        menu::delete_category,
        menu::list_menu_items,
        menu::get_menu_item,
        menu::create_menu_item,
        menu::update_menu_item,
        menu::delete_menu_item,
        orders::create_order,
        orders::list_orders,
        orders::get_stats,
        orders::get_my_orders,
        orders::get_order,
        orders::update_order_status,
        tables::create_table,
        tables::list_tables,
        tables::get_table_by_slug,
        tables::get_table,
        tables::table_qr,
        tables::update_table,
        tables::delete_table,
    ),
    components(
        schemas(
            User,
            MenuCategory,
            MenuItem,
            Table,
            Order,
            OrderItem,
            OrderStatus,
            TableStatus,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateMenuItemRequest,
            UpdateMenuItemRequest,
            MenuItemWithCategory,
            MenuItemList,
            CreateOrderRequest,
            OrderLineRequest,
            UpdateOrderStatusRequest,
            CustomerRef,
            OrderWithItems,
            OrderList,
            StatusStat,
            CategoryRevenue,
            TopItem,
            StatsResponse,
            CreateTableRequest,
            UpdateTableRequest,
            TableList,
            TableQr,
            params::Pagination,
            params::MenuItemQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<StatsResponse>,
            ApiResponse<MenuItemList>,
            ApiResponse<CategoryList>,
            ApiResponse<TableList>,
            ApiResponse<TableQr>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Menu", description = "Menu catalog endpoints"),
        (name = "Orders", description = "Order lifecycle and stats endpoints"),
        (name = "Tables", description = "Table registry endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
