use thiserror::Error;

/// Names of the unique constraints a commit can violate.
///
/// The PostgreSQL schema uses the same names, so both backends report
/// violations identically.
pub mod constraints {
    pub const ORDER_NUMBER: &str = "orders_order_number_key";
    pub const INVOICE_NUMBER: &str = "invoices_invoice_number_key";
    pub const INVOICE_ORDER: &str = "invoices_order_id_key";
    pub const PAYMENT_ORDER: &str = "payments_order_id_key";
    pub const COUPON_CODE: &str = "coupons_code_key";
    pub const COUPON_USAGE_ORDER: &str = "coupon_usages_order_id_key";
    pub const CART_USER: &str = "carts_user_id_key";
    pub const STOCK_PRODUCT: &str = "stocks_pkey";
    pub const ORDER_ID: &str = "orders_pkey";
    pub const PAYMENT_ID: &str = "payments_pkey";

    /// Constraints whose violation means a concurrent writer took the same
    /// document number.
    pub fn is_numbering(constraint: &str) -> bool {
        constraint == ORDER_NUMBER || constraint == INVOICE_NUMBER
    }
}

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A commit or insert would duplicate a unique value.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// An update targeted a row that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An update targeted a row this transaction has not locked.
    #[error("{entity} {id} was updated without being locked")]
    NotLocked { entity: &'static str, id: String },

    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    /// The violated constraint, if this is a unique violation.
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } => Some(constraint),
            _ => None,
        }
    }
}

impl From<domain::UnknownVariant> for StoreError {
    fn from(err: domain::UnknownVariant) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
