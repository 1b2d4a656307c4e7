//! SQLite store for users, profiles, orders and payments

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::application::errors::StorageError;
use crate::domain::entities::{
    Currency, Order, OrderDraft, OrderStatus, PaidTransition, Payment, PaymentDetails,
    PaymentStatus, Profile, User,
};
use crate::domain::traits::Store;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        // Several consumer processes may share the file
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_tables()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_tables(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // One profile per user
        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                user_id INTEGER NOT NULL UNIQUE,
                phone TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'CREATED',
                sender_service TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'CREATED',
                currency TEXT NOT NULL,
                amount REAL NOT NULL,
                name TEXT,
                description TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_profiles_chat ON profiles(chat_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_user_status ON orders(user_id, status)",
            [],
        )?;

        Ok(())
    }
}

fn parse_column<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        user_id: row.get(2)?,
        phone: row.get(3)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: parse_column::<OrderStatus>(row, 2)?,
        sender_service: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        order_id: row.get(1)?,
        status: parse_column::<PaymentStatus>(row, 2)?,
        currency: parse_column::<Currency>(row, 3)?,
        amount: row.get(4)?,
        name: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const ORDER_COLUMNS: &str = "o.id, o.user_id, o.status, o.sender_service, o.created_at";
const PAYMENT_COLUMNS: &str =
    "id, order_id, status, currency, amount, name, description, created_at";

#[async_trait]
impl Store for Database {
    async fn get_or_create_user(&self, username: &str) -> Result<(User, bool), StorageError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, Utc::now()],
        )?;
        let user = conn.query_row(
            "SELECT id, username, created_at FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )?;
        Ok((user, inserted > 0))
    }

    async fn get_or_create_profile(&self, chat_id: &str, user: &User) -> Result<(Profile, bool), StorageError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO profiles (id, chat_id, user_id) VALUES (?1, ?2, ?3)",
            params![uuid::Uuid::new_v4().to_string(), chat_id, user.id],
        )?;
        let profile = conn.query_row(
            "SELECT id, chat_id, user_id, phone FROM profiles WHERE user_id = ?1",
            [user.id],
            profile_from_row,
        )?;

        if profile.chat_id != chat_id {
            return Err(StorageError::Conflict(format!(
                "user '{}' is already linked to another chat",
                user.username
            )));
        }
        Ok((profile, inserted > 0))
    }

    async fn find_profiles(&self, chat_id: &str) -> Result<Vec<Profile>, StorageError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, chat_id, user_id, phone FROM profiles WHERE chat_id = ?1")?;
        let rows = stmt.query_map([chat_id], profile_from_row)?;

        let mut profiles = Vec::new();
        for profile in rows {
            profiles.push(profile?);
        }
        Ok(profiles)
    }

    async fn find_open_order(&self, chat_id: &str) -> Result<Option<Order>, StorageError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM orders o
             JOIN profiles p ON p.user_id = o.user_id
             WHERE p.chat_id = ?1 AND o.status = ?2
             ORDER BY o.created_at DESC
             LIMIT 1",
            ORDER_COLUMNS
        );
        let order = conn
            .query_row(&sql, params![chat_id, OrderStatus::Created.as_str()], order_from_row)
            .optional()?;
        Ok(order)
    }

    async fn read_payment_fields(&self, order: &Order) -> Result<Option<PaymentDetails>, StorageError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM payments WHERE order_id = ?1", PAYMENT_COLUMNS);
        let payment = conn.query_row(&sql, [&order.id], payment_from_row).optional()?;
        Ok(payment.map(|p| p.details()))
    }

    async fn set_paid_atomically(&self, order: &Order) -> Result<PaidTransition, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let orders = tx.execute(
            "UPDATE orders SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![OrderStatus::Paid.as_str(), order.id, OrderStatus::Created.as_str()],
        )?;
        if orders == 0 {
            return Ok(PaidTransition::NotFound);
        }

        let payments = tx.execute(
            "UPDATE payments SET status = ?1 WHERE order_id = ?2",
            params![PaymentStatus::Paid.as_str(), order.id],
        )?;
        if payments == 0 {
            // Dropping the transaction rolls the order update back
            return Ok(PaidTransition::NotFound);
        }

        tx.commit()?;
        Ok(PaidTransition::Paid)
    }

    async fn create_order(&self, user: &User, draft: &OrderDraft) -> Result<(Order, Payment), StorageError> {
        let now: DateTime<Utc> = Utc::now();
        let order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id,
            status: OrderStatus::Created,
            sender_service: draft.sender_service.clone(),
            created_at: now,
        };
        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            status: PaymentStatus::Created,
            currency: draft.currency,
            amount: draft.amount,
            name: draft.name.clone(),
            description: draft.description.clone(),
            created_at: now,
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO orders (id, user_id, status, sender_service, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                order.id,
                order.user_id,
                order.status.as_str(),
                order.sender_service,
                order.created_at
            ],
        )?;
        tx.execute(
            "INSERT INTO payments (id, order_id, status, currency, amount, name, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                payment.id,
                payment.order_id,
                payment.status.as_str(),
                payment.currency.as_str(),
                payment.amount,
                payment.name,
                payment.description,
                payment.created_at
            ],
        )?;
        tx.commit()?;

        Ok((order, payment))
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StorageError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM orders o WHERE o.id = ?1", ORDER_COLUMNS);
        Ok(conn.query_row(&sql, [order_id], order_from_row).optional()?)
    }

    async fn get_payment(&self, order_id: &str) -> Result<Option<Payment>, StorageError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM payments WHERE order_id = ?1", PAYMENT_COLUMNS);
        Ok(conn.query_row(&sql, [order_id], payment_from_row).optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(chat_id: &str) -> (Database, User, Order) {
        let db = Database::open_in_memory().unwrap();
        let (user, _) = db.get_or_create_user("carol").await.unwrap();
        db.get_or_create_profile(chat_id, &user).await.unwrap();
        let draft = OrderDraft::new(Currency::Eur, 9.99).with_description("Tea");
        let (order, _) = db.create_order(&user, &draft).await.unwrap();
        (db, user, order)
    }

    #[tokio::test]
    async fn test_user_and_profile_created_once() {
        let db = Database::open_in_memory().unwrap();
        let (user, created) = db.get_or_create_user("carol").await.unwrap();
        let (again, created_again) = db.get_or_create_user("carol").await.unwrap();
        assert!(created);
        assert!(!created_again);
        assert_eq!(user.id, again.id);

        let (_, profile_created) = db.get_or_create_profile("7", &user).await.unwrap();
        let (_, profile_created_again) = db.get_or_create_profile("7", &user).await.unwrap();
        assert!(profile_created);
        assert!(!profile_created_again);
        assert_eq!(db.find_profiles("7").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_for_other_chat_fails() {
        let db = Database::open_in_memory().unwrap();
        let (user, _) = db.get_or_create_user("carol").await.unwrap();
        db.get_or_create_profile("7", &user).await.unwrap();

        let result = db.get_or_create_profile("8", &user).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_open_order_and_payment_fields() {
        let (db, _, order) = seeded("7").await;

        let open = db.find_open_order("7").await.unwrap().unwrap();
        assert_eq!(open.id, order.id);
        assert!(db.find_open_order("8").await.unwrap().is_none());

        let details = db.read_payment_fields(&open).await.unwrap().unwrap();
        assert_eq!(details.currency, Currency::Eur);
        assert_eq!(details.name, "");
        assert_eq!(details.description, "Tea");
    }

    #[tokio::test]
    async fn test_paid_transition_updates_both_rows() {
        let (db, _, order) = seeded("7").await;

        assert_eq!(db.set_paid_atomically(&order).await.unwrap(), PaidTransition::Paid);

        let stored = db.get_order(&order.id).await.unwrap().unwrap();
        let payment = db.get_payment(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert!(db.find_open_order("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paid_transition_without_payment_rolls_back() {
        let (db, _, order) = seeded("7").await;
        {
            let conn = db.conn().unwrap();
            conn.execute("DELETE FROM payments WHERE order_id = ?1", [&order.id]).unwrap();
        }

        assert_eq!(db.set_paid_atomically(&order).await.unwrap(), PaidTransition::NotFound);
        let stored = db.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
    }
}
