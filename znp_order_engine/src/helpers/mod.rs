mod order_number;

pub use order_number::OrderNumberGenerator;
