pub mod connection;
pub mod limits;
pub mod query;
pub mod readonly;
pub mod schema;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;
