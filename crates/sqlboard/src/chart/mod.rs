pub mod contract;
pub mod validator;
