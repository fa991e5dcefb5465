pub mod walmart;

pub use walmart::WalmartExtractor;
