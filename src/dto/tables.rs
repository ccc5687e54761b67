use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Table, TableStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTableRequest {
    pub number: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTableRequest {
    pub number: Option<i32>,
    pub status: Option<TableStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TableList {
    pub items: Vec<Table>,
}

/// Customer-facing menu URL for a table; QR image rendering happens in
/// the frontend.
#[derive(Debug, Serialize, ToSchema)]
pub struct TableQr {
    pub url: String,
    pub table: Table,
}
