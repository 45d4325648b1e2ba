//! API handlers

pub mod admin_users;
pub mod announcements;
pub mod auth;
pub mod health;
pub mod messages;

use serde::Deserialize;
use utoipa::IntoParams;

/// `?id=` selector used by DELETE endpoints
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdQuery {
    /// Target record ID
    pub id: Option<i64>,
}
