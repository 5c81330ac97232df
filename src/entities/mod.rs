pub mod inventory_level;
pub mod reservation;
pub mod reservation_movement;
pub mod sales_order;
pub mod sales_order_item;
