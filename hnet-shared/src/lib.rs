pub mod address;
pub mod daemon;
pub mod dashboard;
pub mod graphql;
