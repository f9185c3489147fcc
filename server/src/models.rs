//! Row structs mapped straight off joined queries, and the nested response
//! shapes built from them. `unit_price` and `price` on cart and order rows
//! are snapshots taken at write time; nothing here recomputes them from the
//! live menu item.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserOut {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuItemOut {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub featured: bool,
    pub category: Category,
}

/// Flat shape of the menu item × category join.
#[derive(Debug, FromRow)]
pub struct MenuItemRow {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub featured: bool,
    pub category_id: i64,
    pub category_slug: String,
    pub category_title: String,
}

pub const MENU_ITEM_SELECT: &str = "
    SELECT m.id, m.title, m.price, m.featured,
           c.id AS category_id, c.slug AS category_slug, c.title AS category_title
    FROM menu_items m
    JOIN categories c ON c.id = m.category_id";

impl From<MenuItemRow> for MenuItemOut {
    fn from(row: MenuItemRow) -> Self {
        MenuItemOut {
            id: row.id,
            title: row.title,
            price: row.price,
            featured: row.featured,
            category: Category {
                id: row.category_id,
                slug: row.category_slug,
                title: row.category_title,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CartOut {
    pub id: i64,
    pub user: UserOut,
    pub menuitem: MenuItemOut,
    pub quantity: i64,
    pub unit_price: f64,
    pub price: f64,
}

#[derive(Debug, FromRow)]
pub struct CartRow {
    pub id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub price: f64,
    pub user_id: i64,
    pub user_username: String,
    pub menuitem_id: i64,
    pub menuitem_title: String,
    pub menuitem_price: f64,
    pub menuitem_featured: bool,
    pub category_id: i64,
    pub category_slug: String,
    pub category_title: String,
}

pub const CART_SELECT: &str = "
    SELECT cr.id, cr.quantity, cr.unit_price, cr.price,
           u.id AS user_id, u.username AS user_username,
           m.id AS menuitem_id, m.title AS menuitem_title,
           m.price AS menuitem_price, m.featured AS menuitem_featured,
           c.id AS category_id, c.slug AS category_slug, c.title AS category_title
    FROM carts cr
    JOIN users u ON u.id = cr.user_id
    JOIN menu_items m ON m.id = cr.menuitem_id
    JOIN categories c ON c.id = m.category_id";

impl From<CartRow> for CartOut {
    fn from(row: CartRow) -> Self {
        CartOut {
            id: row.id,
            user: UserOut {
                id: row.user_id,
                username: row.user_username,
            },
            menuitem: MenuItemOut {
                id: row.menuitem_id,
                title: row.menuitem_title,
                price: row.menuitem_price,
                featured: row.menuitem_featured,
                category: Category {
                    id: row.category_id,
                    slug: row.category_slug,
                    title: row.category_title,
                },
            },
            quantity: row.quantity,
            unit_price: row.unit_price,
            price: row.price,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderOut {
    pub id: i64,
    pub user: UserOut,
    pub delivery_crew: Option<UserOut>,
    pub status: bool,
    pub total: f64,
    pub date: NaiveDate,
}

#[derive(Debug, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub status: bool,
    pub total: f64,
    pub date: NaiveDate,
    pub user_id: i64,
    pub user_username: String,
    pub crew_id: Option<i64>,
    pub crew_username: Option<String>,
}

pub const ORDER_SELECT: &str = "
    SELECT o.id, o.status, o.total, o.date,
           u.id AS user_id, u.username AS user_username,
           d.id AS crew_id, d.username AS crew_username
    FROM orders o
    JOIN users u ON u.id = o.user_id
    LEFT JOIN users d ON d.id = o.delivery_crew_id";

impl From<OrderRow> for OrderOut {
    fn from(row: OrderRow) -> Self {
        let delivery_crew = match (row.crew_id, row.crew_username) {
            (Some(id), Some(username)) => Some(UserOut { id, username }),
            _ => None,
        };
        OrderOut {
            id: row.id,
            user: UserOut {
                id: row.user_id,
                username: row.user_username,
            },
            delivery_crew,
            status: row.status,
            total: row.total,
            date: row.date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemOut {
    pub id: i64,
    pub order: OrderOut,
    pub menuitem: MenuItemOut,
    pub quantity: i64,
    pub unit_price: f64,
    pub price: f64,
}

#[derive(Debug, FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub price: f64,
    pub order_id: i64,
    pub order_status: bool,
    pub order_total: f64,
    pub order_date: NaiveDate,
    pub user_id: i64,
    pub user_username: String,
    pub crew_id: Option<i64>,
    pub crew_username: Option<String>,
    pub menuitem_id: i64,
    pub menuitem_title: String,
    pub menuitem_price: f64,
    pub menuitem_featured: bool,
    pub category_id: i64,
    pub category_slug: String,
    pub category_title: String,
}

pub const ORDER_ITEM_SELECT: &str = "
    SELECT oi.id, oi.quantity, oi.unit_price, oi.price,
           o.id AS order_id, o.status AS order_status,
           o.total AS order_total, o.date AS order_date,
           u.id AS user_id, u.username AS user_username,
           d.id AS crew_id, d.username AS crew_username,
           m.id AS menuitem_id, m.title AS menuitem_title,
           m.price AS menuitem_price, m.featured AS menuitem_featured,
           c.id AS category_id, c.slug AS category_slug, c.title AS category_title
    FROM order_items oi
    JOIN orders o ON o.id = oi.order_id
    JOIN users u ON u.id = o.user_id
    LEFT JOIN users d ON d.id = o.delivery_crew_id
    JOIN menu_items m ON m.id = oi.menuitem_id
    JOIN categories c ON c.id = m.category_id";

impl From<OrderItemRow> for OrderItemOut {
    fn from(row: OrderItemRow) -> Self {
        let delivery_crew = match (row.crew_id, row.crew_username) {
            (Some(id), Some(username)) => Some(UserOut { id, username }),
            _ => None,
        };
        OrderItemOut {
            id: row.id,
            order: OrderOut {
                id: row.order_id,
                user: UserOut {
                    id: row.user_id,
                    username: row.user_username,
                },
                delivery_crew,
                status: row.order_status,
                total: row.order_total,
                date: row.order_date,
            },
            menuitem: MenuItemOut {
                id: row.menuitem_id,
                title: row.menuitem_title,
                price: row.menuitem_price,
                featured: row.menuitem_featured,
                category: Category {
                    id: row.category_id,
                    slug: row.category_slug,
                    title: row.category_title,
                },
            },
            quantity: row.quantity,
            unit_price: row.unit_price,
            price: row.price,
        }
    }
}
