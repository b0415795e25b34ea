//! Domain models for the order backend.
//!
//! Models are plain data: the services own the rules and the `db` layer
//! owns persistence. Everything here serializes to the JSON the HTTP
//! handlers return.

pub mod actor;
pub mod order;
pub mod payment;
pub mod product;

pub use actor::Actor;
pub use order::{
    CreateOrder, NewHistory, NewOrder, NewOrderItem, Order, OrderHistory, OrderItem,
    OrderItemInput,
};
pub use payment::{NewPayment, Payment};
pub use product::Product;
