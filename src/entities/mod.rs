pub mod order;
pub mod order_item;
pub mod user;
pub mod user_location;
