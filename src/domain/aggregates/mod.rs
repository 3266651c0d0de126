//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductDraft, ProductError};
pub use order::{
    check_comment, NewOrder, Order, OrderComment, OrderError, OrderRecord, OrderStatus, OrderStatusHistory,
    OrderView, StatusChange,
};
pub use cart::{Cart, CartLine, ChangeOutcome, Direction};
