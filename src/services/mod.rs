pub mod auth_service;
pub mod menu_service;
pub mod order_service;
pub mod stats_service;
pub mod table_service;
