use chrono::{Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, Statement};
use uuid::Uuid;

use table_order_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{CreateOrderRequest, OrderLineRequest, UpdateOrderStatusRequest},
    entity::{
        menu_categories::ActiveModel as CategoryActive,
        menu_items::{ActiveModel as MenuItemActive, Entity as MenuItems},
        order_items::ActiveModel as OrderItemActive,
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        tables::{ActiveModel as TableActive, Entity as Tables},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::{OrderStatus, TableStatus},
    routes::params::{OrderListQuery, Pagination},
    services::{order_service, stats_service},
    state::AppState,
};

// Full order lifecycle: placement with snapshots and popularity bumps,
// atomic rejection, occupancy transitions, pagination, and daily stats.
#[tokio::test]
async fn order_lifecycle_and_stats_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;
    let staff = AuthUser {
        user_id: Uuid::new_v4(),
        role: "staff".into(),
    };

    let category_id = create_category(&state, "Mains", 1).await?;
    let burger = create_item(&state, category_id, "Burger", 900, true).await?;
    let fries = create_item(&state, category_id, "Fries", 450, true).await?;
    let off_menu = create_item(&state, category_id, "Oysters", 2400, false).await?;

    let table_id = create_table(&state, 5).await?;

    // --- Placement: totals, snapshots, popularity, occupancy ---

    let resp = order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            table_id,
            items: vec![
                OrderLineRequest {
                    menu_item_id: burger,
                    quantity: 2,
                    note: Some("no onions".into()),
                },
                OrderLineRequest {
                    menu_item_id: fries,
                    quantity: 1,
                    note: None,
                },
            ],
            session_token: Some("guest-session-1".into()),
        },
    )
    .await?;

    let placed = resp.data.unwrap();
    assert_eq!(placed.order.subtotal, 2 * 900 + 450);
    assert_eq!(placed.order.tax, 2250 * 5 / 100);
    assert_eq!(placed.order.total, placed.order.subtotal + placed.order.tax);
    assert_eq!(placed.order.status, OrderStatus::Placed);
    assert_eq!(placed.order.customer_id, None);
    assert_eq!(placed.table_number, Some(5));
    assert_eq!(placed.items.len(), 2);
    let burger_line = placed
        .items
        .iter()
        .find(|i| i.menu_item_id == burger)
        .unwrap();
    assert_eq!(burger_line.name, "Burger");
    assert_eq!(burger_line.price, 900);
    assert_eq!(burger_line.note.as_deref(), Some("no onions"));

    assert_eq!(popularity(&state, burger).await?, 2);
    assert_eq!(popularity(&state, fries).await?, 1);
    assert_eq!(table_status(&state, table_id).await?, "occupied");

    // A later price edit must not rewrite the snapshot.
    let mut reprice: MenuItemActive = MenuItems::find_by_id(burger)
        .one(&state.orm)
        .await?
        .unwrap()
        .into();
    reprice.price = Set(1500);
    reprice.update(&state.orm).await?;

    let fetched = order_service::get_order(&state, placed.order.id)
        .await?
        .data
        .unwrap();
    let line = fetched
        .items
        .iter()
        .find(|i| i.menu_item_id == burger)
        .unwrap();
    assert_eq!(line.price, 900);
    assert_eq!(fetched.order.subtotal, 2250);

    // --- Atomicity: one bad line rejects the whole order ---

    let second_table = create_table(&state, 6).await?;
    let err = order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            table_id: second_table,
            items: vec![
                OrderLineRequest {
                    menu_item_id: burger,
                    quantity: 1,
                    note: None,
                },
                OrderLineRequest {
                    menu_item_id: fries,
                    quantity: 1,
                    note: None,
                },
                OrderLineRequest {
                    menu_item_id: off_menu,
                    quantity: 1,
                    note: None,
                },
            ],
            session_token: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains(&off_menu.to_string())));

    // No popularity moved, no order persisted, table untouched.
    assert_eq!(popularity(&state, burger).await?, 2);
    assert_eq!(popularity(&state, fries).await?, 1);
    assert_eq!(order_count_for_table(&state, second_table).await?, 0);
    assert_eq!(table_status(&state, second_table).await?, "available");

    let err = order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            table_id: Uuid::new_v4(),
            items: vec![OrderLineRequest {
                menu_item_id: burger,
                quantity: 1,
                note: None,
            }],
            session_token: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // --- Transitions: table frees only when the last active order ends ---

    let sibling = order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            table_id,
            items: vec![OrderLineRequest {
                menu_item_id: fries,
                quantity: 3,
                note: None,
            }],
            session_token: None,
        },
    )
    .await?
    .data
    .unwrap();

    let served = order_service::update_order_status(
        &state,
        &staff,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "served".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(served.order.status, OrderStatus::Served);
    assert_eq!(table_status(&state, table_id).await?, "occupied");

    order_service::update_order_status(
        &state,
        &staff,
        sibling.order.id,
        UpdateOrderStatusRequest {
            status: "served".into(),
        },
    )
    .await?;
    assert_eq!(table_status(&state, table_id).await?, "available");

    // Repeating the same transition leaves occupancy unchanged.
    order_service::update_order_status(
        &state,
        &staff,
        sibling.order.id,
        UpdateOrderStatusRequest {
            status: "served".into(),
        },
    )
    .await?;
    assert_eq!(table_status(&state, table_id).await?, "available");

    let err = order_service::update_order_status(
        &state,
        &staff,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = order_service::update_order_status(
        &state,
        &staff,
        Uuid::new_v4(),
        UpdateOrderStatusRequest {
            status: "ready".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Customers cannot drive the lifecycle.
    let customer = AuthUser {
        user_id: Uuid::new_v4(),
        role: "customer".into(),
    };
    let err = order_service::update_order_status(
        &state,
        &customer,
        sibling.order.id,
        UpdateOrderStatusRequest {
            status: "ready".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // --- Pagination: 25 orders, limit 20 -> 2 pages ---

    clear_orders(&state).await?;
    let busy_table = create_table(&state, 7).await?;
    for _ in 0..25 {
        order_service::create_order(
            &state,
            None,
            CreateOrderRequest {
                table_id: busy_table,
                items: vec![OrderLineRequest {
                    menu_item_id: fries,
                    quantity: 1,
                    note: None,
                }],
                session_token: None,
            },
        )
        .await?;
    }

    let page1 = order_service::list_orders(
        &state,
        &staff,
        OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                limit: Some(20),
            },
            status: None,
            table: Some(busy_table),
        },
    )
    .await?;
    let meta = page1.meta.unwrap();
    assert_eq!(page1.data.unwrap().items.len(), 20);
    assert_eq!(meta.total, Some(25));
    assert_eq!(meta.pages, Some(2));

    let page2 = order_service::list_orders(
        &state,
        &staff,
        OrderListQuery {
            pagination: Pagination {
                page: Some(2),
                limit: Some(20),
            },
            status: None,
            table: Some(busy_table),
        },
    )
    .await?;
    assert_eq!(page2.data.unwrap().items.len(), 5);

    let served_filter = order_service::list_orders(
        &state,
        &staff,
        OrderListQuery {
            pagination: Pagination {
                page: None,
                limit: None,
            },
            status: Some("served".into()),
            table: Some(busy_table),
        },
    )
    .await?;
    assert!(served_filter.data.unwrap().items.is_empty());

    // --- My orders ---

    let me = create_user(&state, "Riley", "riley@example.com").await?;
    let customer_auth = AuthUser {
        user_id: me,
        role: "customer".into(),
    };
    let mine = order_service::create_order(
        &state,
        Some(me),
        CreateOrderRequest {
            table_id: busy_table,
            items: vec![OrderLineRequest {
                menu_item_id: burger,
                quantity: 1,
                note: None,
            }],
            session_token: None,
        },
    )
    .await?
    .data
    .unwrap();

    let my_orders = order_service::get_my_orders(&state, &customer_auth)
        .await?
        .data
        .unwrap();
    assert_eq!(my_orders.items.len(), 1);
    assert_eq!(my_orders.items[0].order.id, mine.order.id);
    let customer_ref = my_orders.items[0].customer.as_ref().unwrap();
    assert_eq!(customer_ref.name, "Riley");

    // --- Stats: today only, canceled excluded ---

    clear_orders(&state).await?;
    let drinks = create_category(&state, "Drinks", 2).await?;
    let lemonade = create_item(&state, drinks, "Lemonade", 350, true).await?;

    // Two live orders: 2x Burger (snapshot price 1500 now) + 5x Lemonade.
    order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            table_id: busy_table,
            items: vec![OrderLineRequest {
                menu_item_id: burger,
                quantity: 2,
                note: None,
            }],
            session_token: None,
        },
    )
    .await?;
    order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            table_id: busy_table,
            items: vec![OrderLineRequest {
                menu_item_id: lemonade,
                quantity: 5,
                note: None,
            }],
            session_token: None,
        },
    )
    .await?;

    // A canceled order with a huge quantity must contribute nothing.
    let canceled = order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            table_id: busy_table,
            items: vec![OrderLineRequest {
                menu_item_id: fries,
                quantity: 100,
                note: None,
            }],
            session_token: None,
        },
    )
    .await?
    .data
    .unwrap();
    order_service::update_order_status(
        &state,
        &staff,
        canceled.order.id,
        UpdateOrderStatusRequest {
            status: "canceled".into(),
        },
    )
    .await?;

    // An order from two days ago sits outside the window.
    insert_stale_order(&state, busy_table, lemonade, 50).await?;

    let stats = stats_service::get_stats(&state, &staff).await?.data.unwrap();

    let placed_row = stats
        .order_stats
        .iter()
        .find(|s| s.status == OrderStatus::Placed)
        .unwrap();
    assert_eq!(placed_row.count, 2);
    let canceled_row = stats
        .order_stats
        .iter()
        .find(|s| s.status == OrderStatus::Canceled)
        .unwrap();
    assert_eq!(canceled_row.count, 1);

    assert!(stats.top_items.iter().all(|t| t.name != "Fries"));
    let lemonade_row = stats
        .top_items
        .iter()
        .find(|t| t.menu_item_id == lemonade)
        .unwrap();
    assert_eq!(lemonade_row.total_quantity, 5);
    assert_eq!(lemonade_row.revenue, 5 * 350);

    let drinks_row = stats
        .category_revenue
        .iter()
        .find(|c| c.category == "Drinks")
        .unwrap();
    assert_eq!(drinks_row.revenue, 5 * 350);
    assert_eq!(drinks_row.items_sold, 5);
    let mains_row = stats
        .category_revenue
        .iter()
        .find(|c| c.category == "Mains")
        .unwrap();
    assert_eq!(mains_row.revenue, 2 * 1500);

    // Stats are staff-only.
    let err = stats_service::get_stats(&state, &customer_auth)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, tables, menu_items, menu_categories, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        frontend_url: "http://localhost:3000".into(),
    };

    Ok(AppState { pool, orm, config })
}

async fn clear_orders(state: &AppState) -> anyhow::Result<()> {
    let backend = state.orm.get_database_backend();
    state
        .orm
        .execute(Statement::from_string(
            backend,
            "TRUNCATE TABLE order_items, orders",
        ))
        .await?;
    Ok(())
}

async fn create_category(state: &AppState, name: &str, order: i32) -> anyhow::Result<Uuid> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        display_order: Set(order),
        active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(category.id)
}

async fn create_item(
    state: &AppState,
    category_id: Uuid,
    name: &str,
    price: i64,
    availability: bool,
) -> anyhow::Result<Uuid> {
    let item = MenuItemActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        description: Set(None),
        price: Set(price),
        availability: Set(availability),
        popularity: Set(0),
        category_id: Set(category_id),
        image_url: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(item.id)
}

async fn create_user(state: &AppState, name: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        email: Set(email.into()),
        password_hash: Set("dummy".into()),
        role: Set("customer".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(user.id)
}

async fn create_table(state: &AppState, number: i32) -> anyhow::Result<Uuid> {
    let slug = Uuid::new_v4().simple().to_string();
    let table = TableActive {
        id: Set(Uuid::new_v4()),
        number: Set(number),
        qr_slug: Set(slug[..10].to_string()),
        status: Set(TableStatus::Available.as_str().into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(table.id)
}

async fn popularity(state: &AppState, item_id: Uuid) -> anyhow::Result<i64> {
    let item = MenuItems::find_by_id(item_id)
        .one(&state.orm)
        .await?
        .expect("menu item");
    Ok(item.popularity)
}

async fn table_status(state: &AppState, table_id: Uuid) -> anyhow::Result<String> {
    let table = Tables::find_by_id(table_id)
        .one(&state.orm)
        .await?
        .expect("table");
    Ok(table.status)
}

async fn order_count_for_table(state: &AppState, table_id: Uuid) -> anyhow::Result<u64> {
    use sea_orm::PaginatorTrait;
    let count = Orders::find()
        .filter(OrderCol::TableId.eq(table_id))
        .count(&state.orm)
        .await?;
    Ok(count)
}

async fn insert_stale_order(
    state: &AppState,
    table_id: Uuid,
    menu_item_id: Uuid,
    quantity: i32,
) -> anyhow::Result<()> {
    let two_days_ago = Utc::now() - Duration::days(2);
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        table_id: Set(table_id),
        customer_id: Set(None),
        session_token: Set(None),
        status: Set(OrderStatus::Placed.as_str().into()),
        subtotal: Set(350 * quantity as i64),
        tax: Set(0),
        total: Set(350 * quantity as i64),
        created_at: Set(two_days_ago.into()),
        updated_at: Set(two_days_ago.into()),
    }
    .insert(&state.orm)
    .await?;

    OrderItemActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        menu_item_id: Set(menu_item_id),
        name: Set("Lemonade".into()),
        price: Set(350),
        quantity: Set(quantity),
        note: Set(None),
    }
    .insert(&state.orm)
    .await?;

    Ok(())
}
