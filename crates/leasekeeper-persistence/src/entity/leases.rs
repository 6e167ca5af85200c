//! `SeaORM` Entity for leases table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "leases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub reference: String,
    pub timestamp: i64,
    pub tenant: String,
    pub duration: i32,
    #[sea_orm(nullable)]
    pub resource_name: Option<String>,
    #[sea_orm(nullable)]
    pub creation_tick: Option<i64>,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
